//! Replace dense `br_if` comparison chains with a jump table.
//!
//! Switch statements are emitted as a scrutinee stored in a temporary followed by one
//! `local.get t; i32.const v; i32.eq; br_if d` group per case and a final `br` to the default.
//! When the case values are dense enough, the chain becomes a single `br_table` indexed by the
//! scrutinee minus the smallest case.

use cwasm_wasm::instr::{walk_sequences_mut, BinaryOp, CompareOp};
use cwasm_wasm::{Instr, ValType, WasmFunction};

const MIN_CASES: usize = 3;
const MAX_SPAN: i64 = 4096;

pub fn run(function: &mut WasmFunction) -> bool {
    let mut changed = false;
    walk_sequences_mut(&mut function.body, &mut |body| {
        let mut index = 0;
        while index < body.len() {
            changed |= rewrite_chain(body, index);
            index += 1;
        }
    });
    changed
}

struct Chain {
    scrutinee: u32,
    cases: Vec<(i32, u32)>,
    default: u32,
    /// One past the final `br`.
    end: usize,
}

fn chain_at(body: &[Instr], start: usize) -> Option<Chain> {
    let Instr::LocalSet(scrutinee) = body.get(start)? else {
        return None;
    };
    let mut cases = Vec::new();
    let mut index = start + 1;
    loop {
        match &body[index..] {
            [Instr::LocalGet(t), Instr::I32Const(value), Instr::Compare(ValType::I32, CompareOp::Eq), Instr::BrIf(depth), ..]
                if t == scrutinee =>
            {
                cases.push((*value, *depth));
                index += 4;
            }
            [Instr::Br(default), ..] => {
                return Some(Chain {
                    scrutinee: *scrutinee,
                    cases,
                    default: *default,
                    end: index + 1,
                });
            }
            _ => return None,
        }
    }
}

fn rewrite_chain(body: &mut Vec<Instr>, start: usize) -> bool {
    let Some(chain) = chain_at(body, start) else {
        return false;
    };
    if chain.cases.len() < MIN_CASES {
        return false;
    }
    let (Some(min), Some(max)) = (
        chain.cases.iter().map(|(v, _)| *v as i64).min(),
        chain.cases.iter().map(|(v, _)| *v as i64).max(),
    ) else {
        return false;
    };
    let span = max - min + 1;
    if span > MAX_SPAN || span > 2 * chain.cases.len() as i64 {
        return false;
    }
    let mut targets = vec![None; span as usize];
    // The first comparison for a value wins, as it would in the chain.
    for (value, depth) in &chain.cases {
        let slot = &mut targets[(*value as i64 - min) as usize];
        if slot.is_none() {
            *slot = Some(*depth);
        }
    }
    let targets = targets
        .into_iter()
        .map(|t| t.unwrap_or(chain.default))
        .collect();
    let mut table = vec![Instr::LocalGet(chain.scrutinee)];
    if min != 0 {
        table.push(Instr::I32Const(min as i32));
        table.push(Instr::Binary(ValType::I32, BinaryOp::Sub));
    }
    table.push(Instr::BrTable {
        targets,
        default: chain.default,
    });
    body.splice(start + 1..chain.end, table);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use cwasm_wasm::{BlockType, FuncType};

    fn case(value: i32, depth: u32) -> [Instr; 4] {
        [
            Instr::LocalGet(0),
            Instr::I32Const(value),
            Instr::Compare(ValType::I32, CompareOp::Eq),
            Instr::BrIf(depth),
        ]
    }

    fn function(values: &[i32]) -> WasmFunction {
        let mut chain = vec![Instr::LocalGet(0), Instr::LocalSet(0)];
        for (depth, value) in values.iter().enumerate() {
            chain.extend(case(*value, depth as u32));
        }
        chain.push(Instr::Br(values.len() as u32));
        WasmFunction {
            name: "f".to_owned(),
            ty: FuncType::new(vec![ValType::I32], None),
            locals: vec![],
            body: vec![Instr::Block {
                ty: BlockType::Empty,
                body: chain,
            }],
            export: None,
        }
    }

    #[test]
    fn test_dense_chain_becomes_table() {
        let mut f = function(&[10, 11, 13]);
        assert!(run(&mut f));
        let Instr::Block { body, .. } = &f.body[0] else {
            panic!("expected a block");
        };
        assert_eq!(
            body[2..],
            [
                Instr::LocalGet(0),
                Instr::I32Const(10),
                Instr::Binary(ValType::I32, BinaryOp::Sub),
                Instr::BrTable {
                    targets: vec![0, 1, 3, 2],
                    default: 3
                }
            ]
        );
    }

    #[test]
    fn test_sparse_or_short_chains_stay() {
        assert!(!run(&mut function(&[1, 100, 1000])));
        assert!(!run(&mut function(&[1, 2])));
    }
}
