//! Local variable passes: live range splitting, reallocation and removal of unused locals.

use crate::analysis::{for_each_local_mut, reads, writes, Definition, Interference, ReachingDefinitions};
use cwasm_wasm::{Instr, ValType, WasmFunction};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

#[derive(Debug, Default)]
struct Webs {
    parent: BTreeMap<Definition, Definition>,
}

impl Webs {
    fn find(&mut self, def: Definition) -> Definition {
        let parent = self.parent.get(&def).copied().unwrap_or(def);
        if parent == def {
            return def;
        }
        let root = self.find(parent);
        self.parent.insert(def, root);
        root
    }

    fn union(&mut self, a: Definition, b: Definition) {
        let (a, b) = (self.find(a), self.find(b));
        if a != b {
            self.parent.insert(b, a);
        }
    }
}

/// Give every web of definitions and uses of a local its own local.
///
/// A web is a set of writes whose values may reach a common read. Webs of the same local are
/// independent, so they can live in different locals, which lets reallocation pack them
/// separately. The web holding a local's entry value stays in the original local.
pub fn split_live_ranges(function: &mut WasmFunction) -> bool {
    let count = function.local_count();
    let params = function.ty.params.len() as u32;
    let reaching = ReachingDefinitions::compute(&function.body, count);
    let mut webs = Webs::default();
    let mut entry_used = HashSet::new();
    for defs in reaching.uses.values() {
        let mut defs = defs.iter().copied();
        let Some(first) = defs.next() else {
            continue;
        };
        for def in std::iter::once(first).chain(defs.clone()) {
            if let Definition::Entry(local) = def {
                entry_used.insert(local);
            }
        }
        for def in defs {
            webs.union(first, def);
        }
    }

    let mut roots = BTreeMap::<u32, BTreeSet<Definition>>::new();
    for (position, local) in &reaching.writes {
        roots
            .entry(*local)
            .or_default()
            .insert(webs.find(Definition::Write(*position)));
    }
    let mut assignment = HashMap::<Definition, u32>::new();
    for (local, write_roots) in roots {
        let entry = webs.find(Definition::Entry(local));
        let keeper = match local < params || entry_used.contains(&local) {
            true => Some(entry),
            false => write_roots.first().copied(),
        };
        for root in write_roots {
            if Some(root) == keeper {
                continue;
            }
            let Some(ty) = function.local_type(local) else {
                continue;
            };
            assignment.insert(root, function.add_local(ty));
        }
    }
    if assignment.is_empty() {
        return false;
    }
    tracing::trace!(function = %function.name, webs = assignment.len(), "split live ranges");
    let mut position = 0;
    rename_webs(&mut function.body, &reaching, &mut webs, &assignment, &mut position);
    true
}

fn rename_webs(
    body: &mut [Instr],
    reaching: &ReachingDefinitions,
    webs: &mut Webs,
    assignment: &HashMap<Definition, u32>,
    position: &mut usize,
) {
    for instr in body {
        let here = *position;
        *position += 1;
        match instr {
            Instr::LocalSet(local) | Instr::LocalTee(local) => {
                let root = webs.find(Definition::Write(here));
                if let Some(renamed) = assignment.get(&root) {
                    *local = *renamed;
                }
            }
            Instr::LocalGet(local) => {
                let first = reaching
                    .uses
                    .get(&here)
                    .and_then(|defs| defs.first().copied());
                if let Some(def) = first {
                    let root = webs.find(def);
                    if let Some(renamed) = assignment.get(&root) {
                        *local = *renamed;
                    }
                }
            }
            _ => {
                for nested in instr.bodies_mut() {
                    rename_webs(nested, reaching, webs, assignment, position);
                }
            }
        }
    }
}

/// Pack locals that are never live at the same time into shared slots of the same type.
/// Parameters keep their indices.
pub fn reallocate(function: &mut WasmFunction) -> bool {
    let params = function.ty.params.len() as u32;
    let interference = Interference::compute(&function.body);
    let mut slots: Vec<(ValType, Vec<u32>)> = Vec::new();
    let mut mapping = HashMap::new();
    for (i, ty) in function.locals.iter().enumerate() {
        let local = params + i as u32;
        let free = slots.iter().position(|(slot_ty, members)| {
            slot_ty == ty && members.iter().all(|m| !interference.interferes(local, *m))
        });
        let slot = match free {
            Some(slot) => {
                slots[slot].1.push(local);
                slot
            }
            None => {
                slots.push((*ty, vec![local]));
                slots.len() - 1
            }
        };
        mapping.insert(local, params + slot as u32);
    }
    if slots.len() == function.locals.len() {
        return false;
    }
    tracing::trace!(
        function = %function.name,
        before = function.locals.len(),
        after = slots.len(),
        "reallocated locals"
    );
    for_each_local_mut(&mut function.body, &mut |index| {
        if let Some(renamed) = mapping.get(index) {
            *index = *renamed;
        }
    });
    function.locals = slots.into_iter().map(|(ty, _)| ty).collect();
    true
}

/// Drop locals that are neither read nor written.
pub fn remove_unused(function: &mut WasmFunction) -> bool {
    let params = function.ty.params.len() as u32;
    let mut used = reads(&function.body);
    used.extend(writes(&function.body));
    let mut mapping = HashMap::new();
    let mut locals = Vec::new();
    for (i, ty) in function.locals.iter().enumerate() {
        let local = params + i as u32;
        if used.contains(&local) {
            mapping.insert(local, params + locals.len() as u32);
            locals.push(*ty);
        }
    }
    if locals.len() == function.locals.len() {
        return false;
    }
    for_each_local_mut(&mut function.body, &mut |index| {
        if let Some(renamed) = mapping.get(index) {
            *index = *renamed;
        }
    });
    function.locals = locals;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use cwasm_wasm::instr::BinaryOp;
    use cwasm_wasm::FuncType;

    fn function(locals: Vec<ValType>, body: Vec<Instr>) -> WasmFunction {
        WasmFunction {
            name: "f".to_owned(),
            ty: FuncType::new(vec![ValType::I32], Some(ValType::I32)),
            locals,
            body,
            export: None,
        }
    }

    #[test]
    fn test_independent_values_split_then_share() {
        // Local 1 holds two unrelated values; locals 2 and 3 are short-lived temporaries.
        let body = vec![
            Instr::LocalGet(0),
            Instr::LocalSet(1),
            Instr::LocalGet(1),
            Instr::LocalSet(2),
            Instr::I32Const(5),
            Instr::LocalSet(1),
            Instr::LocalGet(1),
            Instr::LocalSet(3),
            Instr::LocalGet(2),
            Instr::LocalGet(3),
            Instr::Binary(ValType::I32, BinaryOp::Add),
        ];
        let mut f = function(vec![ValType::I32; 3], body);
        assert!(split_live_ranges(&mut f));
        assert_eq!(f.locals.len(), 4);
        assert_eq!(f.body[5], Instr::LocalSet(4));
        assert_eq!(f.body[6], Instr::LocalGet(4));
        assert!(reallocate(&mut f));
        assert!(f.locals.len() < 4);
    }

    #[test]
    fn test_parameters_keep_their_index() {
        let body = vec![
            Instr::LocalGet(0),
            Instr::I32Const(1),
            Instr::Binary(ValType::I32, BinaryOp::Add),
            Instr::LocalSet(0),
            Instr::LocalGet(0),
        ];
        let mut f = function(vec![], body.clone());
        split_live_ranges(&mut f);
        reallocate(&mut f);
        assert_eq!(f.body[0], Instr::LocalGet(0));
    }

    #[test]
    fn test_unused_locals_are_removed() {
        let body = vec![Instr::I32Const(1), Instr::LocalSet(3), Instr::LocalGet(3)];
        let mut f = function(vec![ValType::F64, ValType::I64, ValType::I32], body);
        assert!(remove_unused(&mut f));
        assert_eq!(f.locals, vec![ValType::I32]);
        assert_eq!(
            f.body,
            vec![Instr::I32Const(1), Instr::LocalSet(1), Instr::LocalGet(1)]
        );
    }
}
