//! Local rewrites over short instruction windows.
//!
//! Each rule is enabled by its own flag. The rules run over every sequence until none applies.

use crate::analysis::{branches_to, shift_branches, value_start};
use crate::flags::OptimizationFlags;
use cwasm_wasm::instr::{walk_sequences_mut, BinaryOp};
use cwasm_wasm::numeric;
use cwasm_wasm::{Instr, ValType, Value, WasmFunction};

const MAX_ROUNDS: usize = 16;

pub fn run(function: &mut WasmFunction, flags: &OptimizationFlags) -> bool {
    let mut changed = false;
    for _ in 0..MAX_ROUNDS {
        let mut round = false;
        walk_sequences_mut(&mut function.body, &mut |body| round |= sequence(body, flags));
        if !round {
            break;
        }
        changed = true;
    }
    changed
}

fn sequence(body: &mut Vec<Instr>, flags: &OptimizationFlags) -> bool {
    let mut changed = false;
    let mut index = 0;
    while index < body.len() {
        if rewrite_at(body, index, flags) {
            changed = true;
            // A rewrite can complete a window that starts a few instructions earlier.
            index = index.saturating_sub(3);
        } else {
            index += 1;
        }
    }
    changed
}

fn rewrite_at(body: &mut Vec<Instr>, i: usize, flags: &OptimizationFlags) -> bool {
    match &body[i..] {
        [Instr::Nop, ..] => {
            body.remove(i);
            true
        }
        [Instr::LocalSet(a), Instr::LocalGet(b), ..] if flags.peephole_local_tee && a == b => {
            let local = *a;
            body.splice(i..i + 2, [Instr::LocalTee(local)]);
            true
        }
        [Instr::LocalTee(local), Instr::Drop, ..] if flags.peephole_local_tee => {
            let local = *local;
            body.splice(i..i + 2, [Instr::LocalSet(local)]);
            true
        }
        [Instr::I32Const(0), Instr::Binary(ValType::I32, BinaryOp::Add), ..]
            if flags.peephole_add_0 =>
        {
            body.drain(i..i + 2);
            true
        }
        [Instr::I32Const(a), Instr::Binary(ValType::I32, BinaryOp::Add), Instr::I32Const(b), Instr::Binary(ValType::I32, BinaryOp::Add), ..]
            if flags.peephole_combine_adds =>
        {
            let sum = a.wrapping_add(*b);
            body.splice(
                i..i + 4,
                [
                    Instr::I32Const(sum),
                    Instr::Binary(ValType::I32, BinaryOp::Add),
                ],
            );
            true
        }
        [Instr::I32Const(c), Instr::Binary(ValType::I32, BinaryOp::Add), Instr::Load(kind, memarg), ..]
            if flags.peephole_load_offset && *c >= 0 =>
        {
            let Some(offset) = memarg.offset.checked_add(*c as u32) else {
                return false;
            };
            let mut memarg = *memarg;
            memarg.offset = offset;
            let load = Instr::Load(*kind, memarg);
            body.splice(i..i + 3, [load]);
            true
        }
        [Instr::Store(..), ..] if flags.peephole_load_offset => fold_store_offset(body, i),
        [constant, op, ..] if constant.as_constant().is_some() && is_unary(op) => {
            fold_unary(body, i, flags)
        }
        [lhs, rhs, op, ..]
            if lhs.as_constant().is_some() && rhs.as_constant().is_some() && is_binary(op) =>
        {
            fold_binary(body, i, flags)
        }
        [Instr::I32Const(c), Instr::If { .. }, ..] if flags.peephole_constant_if => {
            let taken = *c != 0;
            let Instr::If {
                ty,
                then,
                otherwise,
            } = &mut body[i + 1]
            else {
                return false;
            };
            let ty = *ty;
            let branch = std::mem::take(if taken { then } else { otherwise });
            body.splice(i..i + 2, [Instr::Block { ty, body: branch }]);
            true
        }
        [Instr::Block { body: inner, .. } | Instr::Loop { body: inner, .. }, ..]
            if flags.peephole_unused_blocks && !branches_to(inner, 0) =>
        {
            let mut inner = match &mut body[i] {
                Instr::Block { body, .. } | Instr::Loop { body, .. } => std::mem::take(body),
                _ => return false,
            };
            shift_branches(&mut inner, 1, -1);
            body.splice(i..i + 1, inner);
            true
        }
        [terminator, _, ..] if flags.peephole_unused_blocks && terminator.is_terminator() => {
            body.truncate(i + 1);
            true
        }
        _ => false,
    }
}

fn is_unary(instr: &Instr) -> bool {
    matches!(instr, Instr::Eqz(_) | Instr::Unary(..) | Instr::Convert(_))
}

fn is_binary(instr: &Instr) -> bool {
    matches!(instr, Instr::Binary(..) | Instr::Compare(..))
}

fn fold_unary(body: &mut Vec<Instr>, i: usize, flags: &OptimizationFlags) -> bool {
    let Some(value) = body[i].as_constant() else {
        return false;
    };
    if !flags.peephole_i32_constants_ops || value.ty() != ValType::I32 {
        return false;
    }
    let folded = match &body[i + 1] {
        Instr::Eqz(ValType::I32) => Value::I32(numeric::eqz(value) as i32),
        Instr::Unary(ValType::I32, op) => numeric::unary(*op, value),
        Instr::Convert(op) if op.input() == ValType::I32 => numeric::convert(*op, value),
        _ => return false,
    };
    body.splice(i..i + 2, [Instr::constant(folded)]);
    true
}

fn fold_binary(body: &mut Vec<Instr>, i: usize, flags: &OptimizationFlags) -> bool {
    let (Some(lhs), Some(rhs)) = (body[i].as_constant(), body[i + 1].as_constant()) else {
        return false;
    };
    let ty = lhs.ty();
    if rhs.ty() != ty {
        return false;
    }
    let folded = match &body[i + 2] {
        Instr::Binary(op_ty, op) if *op_ty == ty => {
            let enabled = match ty {
                ValType::I32 => flags.peephole_i32_constants_ops,
                _ => {
                    flags.peephole_constants_add_mul && matches!(op, BinaryOp::Add | BinaryOp::Mul)
                }
            };
            if !enabled {
                return false;
            }
            // Operations that would trap are left for run time.
            match numeric::binary(*op, lhs, rhs) {
                Ok(value) => value,
                Err(_) => return false,
            }
        }
        Instr::Compare(ValType::I32, op) if ty == ValType::I32 => {
            if !flags.peephole_i32_constants_ops {
                return false;
            }
            Value::I32(numeric::compare(*op, lhs, rhs) as i32)
        }
        _ => return false,
    };
    body.splice(i..i + 3, [Instr::constant(folded)]);
    true
}

/// Move a constant added to a store address into the store's offset. The address operand ends
/// right where the stored value's instructions begin.
fn fold_store_offset(body: &mut Vec<Instr>, i: usize) -> bool {
    let Instr::Store(kind, memarg) = &body[i] else {
        return false;
    };
    let (kind, mut memarg) = (*kind, *memarg);
    let Some(value) = value_start(body, i) else {
        return false;
    };
    if value < 2 {
        return false;
    }
    let Instr::I32Const(c) = body[value - 2] else {
        return false;
    };
    if c < 0 || body[value - 1] != Instr::Binary(ValType::I32, BinaryOp::Add) {
        return false;
    }
    let Some(offset) = memarg.offset.checked_add(c as u32) else {
        return false;
    };
    memarg.offset = offset;
    body[i] = Instr::Store(kind, memarg);
    body.drain(value - 2..value);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use cwasm_wasm::instr::{LoadKind, MemArg, StoreKind};
    use cwasm_wasm::{BlockType, FuncType};

    fn optimize(body: Vec<Instr>, flags: OptimizationFlags) -> Vec<Instr> {
        let mut function = WasmFunction {
            name: "f".to_owned(),
            ty: FuncType::new(vec![ValType::I32], Some(ValType::I32)),
            locals: vec![ValType::I32],
            body,
            export: None,
        };
        run(&mut function, &flags);
        function.body
    }

    #[test]
    fn test_set_then_get_becomes_tee() {
        let body = vec![Instr::I32Const(3), Instr::LocalSet(1), Instr::LocalGet(1)];
        let flags = OptimizationFlags {
            peephole_local_tee: true,
            ..OptimizationFlags::none()
        };
        assert_eq!(
            optimize(body, flags),
            vec![Instr::I32Const(3), Instr::LocalTee(1)]
        );
    }

    #[test]
    fn test_constants_fold_but_traps_stay() {
        let flags = OptimizationFlags::default();
        let body = vec![
            Instr::I32Const(6),
            Instr::I32Const(7),
            Instr::Binary(ValType::I32, BinaryOp::Mul),
            Instr::I32Const(1),
            Instr::Binary(ValType::I32, BinaryOp::Add),
        ];
        assert_eq!(optimize(body, flags), vec![Instr::I32Const(43)]);
        let body = vec![
            Instr::I32Const(1),
            Instr::I32Const(0),
            Instr::Binary(ValType::I32, BinaryOp::DivS),
        ];
        assert_eq!(optimize(body.clone(), flags), body);
    }

    #[test]
    fn test_address_constants_move_into_offsets() {
        let flags = OptimizationFlags::default();
        let body = vec![
            Instr::LocalGet(0),
            Instr::I32Const(8),
            Instr::Binary(ValType::I32, BinaryOp::Add),
            Instr::Load(LoadKind::I32, MemArg::new(4, 2)),
            Instr::LocalSet(1),
            Instr::LocalGet(0),
            Instr::I32Const(16),
            Instr::Binary(ValType::I32, BinaryOp::Add),
            Instr::LocalGet(1),
            Instr::Store(StoreKind::I32, MemArg::new(0, 2)),
            Instr::LocalGet(1),
        ];
        assert_eq!(
            optimize(body, flags),
            vec![
                Instr::LocalGet(0),
                Instr::Load(LoadKind::I32, MemArg::new(12, 2)),
                Instr::LocalSet(1),
                Instr::LocalGet(0),
                Instr::LocalGet(1),
                Instr::Store(StoreKind::I32, MemArg::new(16, 2)),
                Instr::LocalGet(1),
            ]
        );
    }

    #[test]
    fn test_constant_if_and_unused_blocks() {
        let flags = OptimizationFlags::default();
        let body = vec![
            Instr::I32Const(1),
            Instr::If {
                ty: BlockType::Result(ValType::I32),
                then: vec![Instr::I32Const(5)],
                otherwise: vec![Instr::I32Const(6)],
            },
            Instr::Return,
            Instr::Unreachable,
        ];
        assert_eq!(
            optimize(body, flags),
            vec![Instr::I32Const(5), Instr::Return]
        );
    }
}
