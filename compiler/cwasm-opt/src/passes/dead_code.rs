//! Dead code elimination.
//!
//! Writes to locals that are never read are dropped, and values that are computed only to be
//! dropped are not computed at all.

use crate::analysis::{is_pure, reads, value_start};
use cwasm_wasm::instr::walk_sequences_mut;
use cwasm_wasm::{Instr, WasmFunction};

pub fn run(function: &mut WasmFunction) -> bool {
    let mut changed = false;
    loop {
        let round = remove_dead_stores(function) | remove_dropped_values(function);
        if !round {
            break;
        }
        changed = true;
    }
    changed
}

/// Turn `local.set` of a never-read local into `drop` and remove `local.tee` of one.
pub fn remove_dead_stores(function: &mut WasmFunction) -> bool {
    let live = reads(&function.body);
    let mut changed = false;
    walk_sequences_mut(&mut function.body, &mut |body| {
        body.retain_mut(|instr| match instr {
            Instr::LocalSet(index) if !live.contains(index) => {
                *instr = Instr::Drop;
                changed = true;
                true
            }
            Instr::LocalTee(index) if !live.contains(index) => {
                changed = true;
                false
            }
            _ => true,
        })
    });
    changed
}

fn remove_dropped_values(function: &mut WasmFunction) -> bool {
    let mut changed = false;
    walk_sequences_mut(&mut function.body, &mut |body| {
        let mut index = 0;
        while index < body.len() {
            match &body[index] {
                Instr::Nop => {
                    body.remove(index);
                    changed = true;
                }
                Instr::Drop => match value_start(body, index) {
                    Some(start) if is_pure(&body[start..index]) => {
                        body.drain(start..=index);
                        changed = true;
                        index = start;
                    }
                    _ => index += 1,
                },
                _ => index += 1,
            }
        }
    });
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use cwasm_wasm::instr::BinaryOp;
    use cwasm_wasm::{FuncType, ValType};

    #[test]
    fn test_unread_locals_and_their_values_disappear() {
        let mut function = WasmFunction {
            name: "f".to_owned(),
            ty: FuncType::new(vec![ValType::I32], Some(ValType::I32)),
            locals: vec![ValType::I32],
            body: vec![
                Instr::LocalGet(0),
                Instr::I32Const(2),
                Instr::Binary(ValType::I32, BinaryOp::Mul),
                Instr::LocalSet(1),
                Instr::LocalGet(0),
                Instr::Call(0),
                Instr::Drop,
            ],
            export: None,
        };
        assert!(run(&mut function));
        // The call may have effects, so its result is still dropped.
        assert_eq!(
            function.body,
            vec![Instr::LocalGet(0), Instr::Call(0), Instr::Drop]
        );
    }
}
