//! Function inlining.
//!
//! Only leaf functions are inlined: functions that call nothing and never touch globals. Such a
//! function cannot use the shadow stack, so its body can run inside any caller's frame. A call
//! becomes a block that receives the arguments in fresh locals; `return` becomes a branch out of
//! that block. Callees that are inlined everywhere and are neither exported nor reachable through
//! the table are removed from the module.

use crate::analysis::size;
use cwasm_wasm::instr::walk;
use cwasm_wasm::{BlockType, Instr, ValType, WasmFunction, WasmModule};
use std::collections::{BTreeMap, BTreeSet};

const MAX_SIZE: usize = 50;
const ALWAYS_SCORE: usize = 8;
const FEW_USES_SCORE: usize = 16;
const FEW_USES: usize = 3;
const LOCAL_WEIGHT: usize = 5;

/// The part of a callee needed to expand a call.
struct Callee {
    params: Vec<ValType>,
    locals: Vec<ValType>,
    result: BlockType,
    body: Vec<Instr>,
}

pub fn run(module: &mut WasmModule) -> bool {
    let callees = select(module);
    if callees.is_empty() {
        return false;
    }
    tracing::debug!(count = callees.len(), "inlining leaf functions");
    for function in &mut module.functions {
        let mut body = std::mem::take(&mut function.body);
        expand(&mut body, function, &callees);
        function.body = body;
    }
    let removable = callees
        .keys()
        .copied()
        .filter(|index| {
            !module.is_in_table(*index)
                && module
                    .defined_function(*index)
                    .is_some_and(|f| f.export.is_none())
        })
        .collect::<BTreeSet<_>>();
    remove_functions(module, &removable);
    true
}

fn select(module: &WasmModule) -> BTreeMap<u32, Callee> {
    let mut uses = BTreeMap::<u32, usize>::new();
    for function in &module.functions {
        walk(&function.body, &mut |instr| {
            if let Instr::Call(index) = instr {
                *uses.entry(*index).or_default() += 1;
            }
        });
    }
    let mut callees = BTreeMap::new();
    for (position, function) in module.functions.iter().enumerate() {
        let index = module.import_count() + position as u32;
        let Some(count) = uses.get(&index).copied() else {
            continue;
        };
        if !is_leaf(&function.body) {
            continue;
        }
        let size = size(&function.body);
        if size > MAX_SIZE {
            continue;
        }
        let score = size + function.locals.len() * LOCAL_WEIGHT;
        let private = function.export.is_none() && !module.is_in_table(index);
        let worth = score <= ALWAYS_SCORE || (score <= FEW_USES_SCORE && count <= FEW_USES && private);
        if worth {
            callees.insert(
                index,
                Callee {
                    params: function.ty.params.clone(),
                    locals: function.locals.clone(),
                    result: function
                        .ty
                        .result
                        .map(BlockType::Result)
                        .unwrap_or(BlockType::Empty),
                    body: function.body.clone(),
                },
            );
        }
    }
    callees
}

fn is_leaf(body: &[Instr]) -> bool {
    let mut leaf = true;
    walk(body, &mut |instr| {
        if matches!(
            instr,
            Instr::Call(_) | Instr::CallIndirect(_) | Instr::GlobalGet(_) | Instr::GlobalSet(_)
        ) {
            leaf = false;
        }
    });
    leaf
}

fn expand(body: &mut Vec<Instr>, function: &mut WasmFunction, callees: &BTreeMap<u32, Callee>) {
    let mut index = 0;
    while index < body.len() {
        for nested in body[index].bodies_mut() {
            expand(nested, function, callees);
        }
        let Instr::Call(target) = body[index] else {
            index += 1;
            continue;
        };
        let Some(callee) = callees.get(&target) else {
            index += 1;
            continue;
        };
        let expansion = instantiate(callee, function);
        let length = expansion.len();
        body.splice(index..index + 1, expansion);
        index += length;
    }
}

/// The instructions replacing one call, with the callee's locals mapped into `caller`.
fn instantiate(callee: &Callee, caller: &mut WasmFunction) -> Vec<Instr> {
    let base = caller.local_count();
    for ty in callee.params.iter().chain(&callee.locals) {
        caller.add_local(*ty);
    }
    let params = callee.params.len() as u32;
    // Arguments are on the stack in order, so the last one is stored first.
    let mut out = (0..params)
        .rev()
        .map(|i| Instr::LocalSet(base + i))
        .collect::<Vec<_>>();
    // The block may run more than once in the caller, so the callee's locals restart at zero.
    let mut inner = Vec::new();
    for (i, ty) in callee.locals.iter().enumerate() {
        inner.push(Instr::constant(ty.zero()));
        inner.push(Instr::LocalSet(base + params + i as u32));
    }
    let mut body = callee.body.clone();
    remap(&mut body, base, 0);
    inner.extend(body);
    out.push(Instr::Block {
        ty: callee.result,
        body: inner,
    });
    out
}

fn remap(body: &mut [Instr], base: u32, depth: u32) {
    for instr in body {
        match instr {
            Instr::LocalGet(index) | Instr::LocalSet(index) | Instr::LocalTee(index) => {
                *index += base
            }
            Instr::Return => *instr = Instr::Br(depth),
            _ => {
                for nested in instr.bodies_mut() {
                    remap(nested, base, depth + 1);
                }
            }
        }
    }
}

/// Delete defined functions by function-space index and renumber the rest.
fn remove_functions(module: &mut WasmModule, removed: &BTreeSet<u32>) {
    if removed.is_empty() {
        return;
    }
    let imports = module.import_count();
    let renumber = |index: u32| index - removed.range(..index).count() as u32;
    let mut position = imports;
    module.functions.retain(|_| {
        let keep = !removed.contains(&position);
        position += 1;
        keep
    });
    for function in &mut module.functions {
        renumber_calls(&mut function.body, &renumber);
    }
    for entry in &mut module.table {
        *entry = renumber(*entry);
    }
}

fn renumber_calls(body: &mut [Instr], renumber: &impl Fn(u32) -> u32) {
    for instr in body {
        if let Instr::Call(index) = instr {
            *index = renumber(*index);
        }
        for nested in instr.bodies_mut() {
            renumber_calls(nested, renumber);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cwasm_wasm::instr::BinaryOp;
    use cwasm_wasm::FuncType;

    fn function(name: &str, params: usize, body: Vec<Instr>, export: bool) -> WasmFunction {
        WasmFunction {
            name: name.to_owned(),
            ty: FuncType::new(vec![ValType::I32; params], Some(ValType::I32)),
            locals: vec![],
            body,
            export: export.then(|| name.to_owned()),
        }
    }

    #[test]
    fn test_small_private_callee_is_inlined_and_removed() {
        let mut module = WasmModule::new();
        module.functions.push(function(
            "add",
            2,
            vec![
                Instr::LocalGet(0),
                Instr::LocalGet(1),
                Instr::Binary(ValType::I32, BinaryOp::Add),
                Instr::Return,
            ],
            false,
        ));
        module.functions.push(function(
            "main",
            1,
            vec![Instr::LocalGet(0), Instr::I32Const(1), Instr::Call(0)],
            true,
        ));
        assert!(run(&mut module));
        assert_eq!(module.functions.len(), 1);
        let main = &module.functions[0];
        assert_eq!(main.locals, vec![ValType::I32, ValType::I32]);
        assert_eq!(
            main.body,
            vec![
                Instr::LocalGet(0),
                Instr::I32Const(1),
                Instr::LocalSet(2),
                Instr::LocalSet(1),
                Instr::Block {
                    ty: BlockType::Result(ValType::I32),
                    body: vec![
                        Instr::LocalGet(1),
                        Instr::LocalGet(2),
                        Instr::Binary(ValType::I32, BinaryOp::Add),
                        Instr::Br(0),
                    ],
                },
            ]
        );
    }

    #[test]
    fn test_callers_are_not_inlined() {
        let mut module = WasmModule::new();
        module
            .functions
            .push(function("leaf", 0, vec![Instr::I32Const(1)], true));
        module
            .functions
            .push(function("mid", 0, vec![Instr::Call(0)], true));
        module
            .functions
            .push(function("top", 0, vec![Instr::Call(1)], true));
        assert!(run(&mut module));
        // Exported callees stay even though every call was expanded.
        assert_eq!(module.functions.len(), 3);
        assert_eq!(module.functions[2].body, vec![Instr::Call(1)]);
    }
}
