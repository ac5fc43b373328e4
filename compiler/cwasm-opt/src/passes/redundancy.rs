//! Partial redundancy elimination for loops.
//!
//! A pure expression that a loop evaluates more often than it writes the expression's operands
//! is computed once into a fresh local before the loop and read from there. Every write to an
//! operand inside the loop is followed by a recomputation of the local, so it holds the current
//! value wherever the expression used to be. Only pure, non-trapping instructions are moved, so
//! evaluating them ahead of the loop is unobservable even when the loop body would not have
//! reached them.

use crate::analysis::{reads, value_start};
use crate::passes::{result_type, Locals};
use cwasm_wasm::instr::walk;
use cwasm_wasm::{Instr, WasmFunction};
use std::collections::HashSet;

/// Hoisted expressions need at least an operation and its operands.
const MIN_LENGTH: usize = 3;

/// Upper bound on expressions hoisted out of a single loop.
const MAX_HOISTED: usize = 16;

pub fn run(function: &mut WasmFunction) -> bool {
    let mut locals = Locals::new(&function.ty.params, &mut function.locals);
    hoist(&mut function.body, &mut locals)
}

/// Loops nested inside a loop are handled before the loop itself.
fn hoist(body: &mut Vec<Instr>, locals: &mut Locals<'_>) -> bool {
    let mut changed = false;
    let mut index = 0;
    while index < body.len() {
        for nested in body[index].bodies_mut() {
            changed |= hoist(nested, locals);
        }
        let Instr::Loop { body: inner, .. } = &mut body[index] else {
            index += 1;
            continue;
        };
        let mut hoisted = Vec::new();
        for _ in 0..MAX_HOISTED {
            let Some(expression) = best_candidate(inner) else {
                break;
            };
            let Some(ty) = expression.last().and_then(|last| result_type(last, locals)) else {
                break;
            };
            let local = locals.add(ty);
            replace(inner, &expression, local);
            refresh(inner, &expression, &reads(&expression), local);
            hoisted.extend(expression);
            hoisted.push(Instr::LocalSet(local));
        }
        if hoisted.is_empty() {
            index += 1;
            continue;
        }
        changed = true;
        let length = hoisted.len();
        body.splice(index..index, hoisted);
        index += length + 1;
    }
    changed
}

fn is_movable(range: &[Instr]) -> bool {
    range.iter().all(|instr| match instr {
        Instr::GlobalGet(_) => false,
        other => other.is_pure(),
    })
}

fn is_operation(instr: &Instr) -> bool {
    matches!(
        instr,
        Instr::Binary(..) | Instr::Compare(..) | Instr::Unary(..) | Instr::Eqz(_) | Instr::Convert(_)
    )
}

/// Number of writes in the tree to any of `operands`.
fn write_sites(body: &[Instr], operands: &HashSet<u32>) -> usize {
    let mut count = 0;
    walk(body, &mut |instr| {
        if let Instr::LocalSet(index) | Instr::LocalTee(index) = instr {
            if operands.contains(index) {
                count += 1;
            }
        }
    });
    count
}

/// Non-overlapping occurrences of `expression` in the tree.
fn occurrences(body: &[Instr], expression: &[Instr]) -> usize {
    let mut count = 0;
    let mut index = 0;
    while index < body.len() {
        if body[index..].starts_with(expression) {
            count += 1;
            index += expression.len();
            continue;
        }
        for nested in body[index].bodies() {
            count += occurrences(nested, expression);
        }
        index += 1;
    }
    count
}

/// The longest movable expression in the loop body that is evaluated more often than its
/// operands are written. Expressions over locals the loop never writes always qualify.
fn best_candidate(body: &[Instr]) -> Option<Vec<Instr>> {
    let mut sequences = Vec::new();
    collect(body, &mut sequences);
    let mut best: Option<&[Instr]> = None;
    for sequence in sequences {
        for end in 1..=sequence.len() {
            if !is_operation(&sequence[end - 1]) {
                continue;
            }
            let Some(start) = value_start(sequence, end) else {
                continue;
            };
            let range = &sequence[start..end];
            if range.len() < MIN_LENGTH
                || best.is_some_and(|b| range.len() <= b.len())
                || !is_movable(range)
            {
                continue;
            }
            if occurrences(body, range) > write_sites(body, &reads(range)) {
                best = Some(range);
            }
        }
    }
    best.map(<[Instr]>::to_vec)
}

fn collect<'a>(body: &'a [Instr], out: &mut Vec<&'a [Instr]>) {
    out.push(body);
    for instr in body {
        for nested in instr.bodies() {
            collect(nested, out);
        }
    }
}

/// Replace every occurrence of `expression` in the tree with a read of `local`.
fn replace(body: &mut Vec<Instr>, expression: &[Instr], local: u32) {
    let mut index = 0;
    while index < body.len() {
        if body[index..].starts_with(expression) {
            body.splice(index..index + expression.len(), [Instr::LocalGet(local)]);
        } else {
            for nested in body[index].bodies_mut() {
                replace(nested, expression, local);
            }
        }
        index += 1;
    }
}

/// Recompute `local` after every write to one of `operands`. A `local.tee` keeps its value on
/// the stack below the recomputation, which is balanced.
fn refresh(body: &mut Vec<Instr>, expression: &[Instr], operands: &HashSet<u32>, local: u32) {
    let mut index = 0;
    while index < body.len() {
        for nested in body[index].bodies_mut() {
            refresh(nested, expression, operands, local);
        }
        let written = matches!(
            &body[index],
            Instr::LocalSet(i) | Instr::LocalTee(i) if operands.contains(i)
        );
        index += 1;
        if written {
            let update = expression.iter().cloned().chain([Instr::LocalSet(local)]);
            let length = expression.len() + 1;
            body.splice(index..index, update);
            index += length;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cwasm_wasm::instr::{BinaryOp, CompareOp};
    use cwasm_wasm::{BlockType, FuncType, ValType};

    #[test]
    fn test_invariant_product_leaves_the_loop() {
        // while (i < n * m) i++;
        let mut function = WasmFunction {
            name: "f".to_owned(),
            ty: FuncType::new(vec![ValType::I32, ValType::I32], None),
            locals: vec![ValType::I32],
            body: vec![Instr::Loop {
                ty: BlockType::Empty,
                body: vec![
                    Instr::LocalGet(2),
                    Instr::I32Const(1),
                    Instr::Binary(ValType::I32, BinaryOp::Add),
                    Instr::LocalTee(2),
                    Instr::LocalGet(0),
                    Instr::LocalGet(1),
                    Instr::Binary(ValType::I32, BinaryOp::Mul),
                    Instr::Compare(ValType::I32, CompareOp::LtS),
                    Instr::BrIf(0),
                ],
            }],
            export: None,
        };
        assert!(run(&mut function));
        assert_eq!(function.locals, vec![ValType::I32, ValType::I32]);
        assert_eq!(
            function.body[..4],
            [
                Instr::LocalGet(0),
                Instr::LocalGet(1),
                Instr::Binary(ValType::I32, BinaryOp::Mul),
                Instr::LocalSet(3),
            ]
        );
        let Instr::Loop { body, .. } = &function.body[4] else {
            panic!("expected the loop after the hoisted code");
        };
        assert_eq!(body[4], Instr::LocalGet(3));
        assert_eq!(body.len(), 7);
    }

    #[test]
    fn test_expression_is_refreshed_after_operand_writes() {
        let sum = [
            Instr::LocalGet(0),
            Instr::LocalGet(1),
            Instr::Binary(ValType::I32, BinaryOp::Add),
        ];
        // do { x = a + b; y = a + b; if (y) b++; } while (b);
        let mut body = sum.to_vec();
        body.push(Instr::LocalSet(2));
        body.extend(sum.clone());
        body.extend([
            Instr::LocalSet(3),
            Instr::LocalGet(3),
            Instr::If {
                ty: BlockType::Empty,
                then: vec![
                    Instr::LocalGet(1),
                    Instr::I32Const(1),
                    Instr::Binary(ValType::I32, BinaryOp::Add),
                    Instr::LocalSet(1),
                ],
                otherwise: vec![],
            },
            Instr::LocalGet(1),
            Instr::BrIf(0),
        ]);
        let mut function = WasmFunction {
            name: "f".to_owned(),
            ty: FuncType::new(vec![ValType::I32, ValType::I32], None),
            locals: vec![ValType::I32, ValType::I32],
            body: vec![Instr::Loop {
                ty: BlockType::Empty,
                body,
            }],
            export: None,
        };
        assert!(run(&mut function));
        assert_eq!(function.locals.len(), 3);
        assert_eq!(function.body[..3], sum);
        assert_eq!(function.body[3], Instr::LocalSet(4));
        let Instr::Loop { body, .. } = &function.body[4] else {
            panic!("expected the loop after the hoisted code");
        };
        assert_eq!(
            body[..4],
            [
                Instr::LocalGet(4),
                Instr::LocalSet(2),
                Instr::LocalGet(4),
                Instr::LocalSet(3),
            ]
        );
        let Instr::If { then, .. } = &body[5] else {
            panic!("expected the conditional increment");
        };
        assert_eq!(then[4..7], sum);
        assert_eq!(then[7], Instr::LocalSet(4));
    }

    #[test]
    fn test_frequently_written_operands_stay_in_the_loop() {
        // do { i = i + 1; s = s + i * k; } while (i < k);
        let body = vec![
            Instr::LocalGet(2),
            Instr::I32Const(1),
            Instr::Binary(ValType::I32, BinaryOp::Add),
            Instr::LocalSet(2),
            Instr::LocalGet(3),
            Instr::LocalGet(2),
            Instr::LocalGet(0),
            Instr::Binary(ValType::I32, BinaryOp::Mul),
            Instr::Binary(ValType::I32, BinaryOp::Add),
            Instr::LocalSet(3),
            Instr::LocalGet(2),
            Instr::LocalGet(0),
            Instr::Compare(ValType::I32, CompareOp::LtS),
            Instr::BrIf(0),
        ];
        let mut function = WasmFunction {
            name: "f".to_owned(),
            ty: FuncType::new(vec![ValType::I32], None),
            locals: vec![ValType::I32, ValType::I32, ValType::I32],
            body: vec![Instr::Loop {
                ty: BlockType::Empty,
                body: body.clone(),
            }],
            export: None,
        };
        assert!(!run(&mut function));
        assert_eq!(function.body, vec![Instr::Loop { ty: BlockType::Empty, body }]);
    }
}
