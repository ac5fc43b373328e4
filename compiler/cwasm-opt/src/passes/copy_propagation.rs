//! Copy and constant propagation.
//!
//! A forward walk over the tree tracks which locals currently hold a copy of another local or a
//! known constant, and rewrites reads accordingly. Facts enter nested blocks but only facts about
//! locals not written inside survive them; loops forget everything they write before the first
//! iteration. Writes left without readers are removed afterwards.

use crate::analysis::writes;
use crate::passes::dead_code;
use cwasm_wasm::{Instr, Value, WasmFunction};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy)]
enum Source {
    Local(u32),
    Constant(Value),
}

#[derive(Debug, Clone, Default)]
struct Facts(BTreeMap<u32, Source>);

impl Facts {
    fn kill(&mut self, local: u32) {
        self.0.remove(&local);
        self.0
            .retain(|_, source| !matches!(source, Source::Local(l) if *l == local));
    }

    fn kill_all(&mut self, locals: &HashSet<u32>) {
        for local in locals {
            self.kill(*local);
        }
    }
}

pub fn run(function: &mut WasmFunction) -> bool {
    let mut facts = Facts::default();
    let changed = sequence(&mut function.body, &mut facts);
    dead_code::remove_dead_stores(function) | changed
}

fn sequence(body: &mut [Instr], facts: &mut Facts) -> bool {
    let mut changed = false;
    for index in 0..body.len() {
        match &mut body[index] {
            Instr::LocalGet(local) => match facts.0.get(local) {
                Some(Source::Local(source)) => {
                    *local = *source;
                    changed = true;
                }
                Some(Source::Constant(value)) => {
                    body[index] = Instr::constant(*value);
                    changed = true;
                }
                None => {}
            },
            Instr::LocalSet(local) | Instr::LocalTee(local) => {
                let local = *local;
                facts.kill(local);
                let source = match index.checked_sub(1).map(|i| &body[i]) {
                    Some(Instr::LocalGet(source)) if *source != local => {
                        Some(Source::Local(*source))
                    }
                    Some(other) => other.as_constant().map(Source::Constant),
                    None => None,
                };
                if let Some(source) = source {
                    facts.0.insert(local, source);
                }
            }
            Instr::Block { body, .. } => {
                let written = writes(body);
                let mut inner = facts.clone();
                changed |= sequence(body, &mut inner);
                facts.kill_all(&written);
            }
            Instr::Loop { body, .. } => {
                let written = writes(body);
                facts.kill_all(&written);
                let mut inner = facts.clone();
                changed |= sequence(body, &mut inner);
            }
            Instr::If {
                then, otherwise, ..
            } => {
                let mut written = writes(then);
                written.extend(writes(otherwise));
                let mut inner = facts.clone();
                changed |= sequence(then, &mut inner);
                let mut inner = facts.clone();
                changed |= sequence(otherwise, &mut inner);
                facts.kill_all(&written);
            }
            _ => {}
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use cwasm_wasm::instr::BinaryOp;
    use cwasm_wasm::{BlockType, FuncType, ValType};

    #[test]
    fn test_copies_forward_into_blocks_but_not_loops() {
        let mut function = WasmFunction {
            name: "f".to_owned(),
            ty: FuncType::new(vec![ValType::I32], Some(ValType::I32)),
            locals: vec![ValType::I32, ValType::I32],
            body: vec![
                Instr::LocalGet(0),
                Instr::LocalSet(1),
                Instr::I32Const(7),
                Instr::LocalSet(2),
                Instr::Loop {
                    ty: BlockType::Empty,
                    body: vec![
                        Instr::LocalGet(1),
                        Instr::LocalGet(2),
                        Instr::Binary(ValType::I32, BinaryOp::Add),
                        Instr::LocalSet(2),
                    ],
                },
                Instr::LocalGet(2),
            ],
            export: None,
        };
        assert!(run(&mut function));
        assert_eq!(
            function.body[2..],
            [
                Instr::I32Const(7),
                Instr::LocalSet(2),
                Instr::Loop {
                    ty: BlockType::Empty,
                    body: vec![
                        Instr::LocalGet(0),
                        Instr::LocalGet(2),
                        Instr::Binary(ValType::I32, BinaryOp::Add),
                        Instr::LocalSet(2),
                    ],
                },
                Instr::LocalGet(2),
            ]
        );
        // Local 1 is no longer read, so its store became a drop.
        assert_eq!(function.body[..2], [Instr::LocalGet(0), Instr::Drop]);
    }
}
