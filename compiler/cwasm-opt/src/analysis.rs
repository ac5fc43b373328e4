//! Analyses shared by the passes.
//!
//! Instruction trees are analysed directly, without building an explicit control-flow graph:
//! every structured instruction is one region, and branches are resolved against a stack of the
//! enclosing labels. Loops iterate to a fixed point.

use cwasm_wasm::instr::walk;
use cwasm_wasm::Instr;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Number of instructions in the tree.
pub fn size(body: &[Instr]) -> usize {
    let mut count = 0;
    walk(body, &mut |_| count += 1);
    count
}

/// The index at which the instructions producing the operand consumed at `end` begin, so that
/// `body[start..end]` pushes exactly one value. Calls and structured instructions are not looked
/// through.
pub fn value_start(body: &[Instr], end: usize) -> Option<usize> {
    let mut needed = 1usize;
    for index in (0..end).rev() {
        let (pops, pushes) = body[index].stack_effect()?;
        if pushes > needed {
            return None;
        }
        needed = needed - pushes + pops;
        if needed == 0 {
            return Some(index);
        }
    }
    None
}

/// Whether every instruction in the range only computes a value.
pub fn is_pure(body: &[Instr]) -> bool {
    body.iter().all(|i| i.is_pure())
}

/// Locals read anywhere in the tree.
pub fn reads(body: &[Instr]) -> HashSet<u32> {
    let mut reads = HashSet::new();
    walk(body, &mut |instr| {
        if let Instr::LocalGet(index) = instr {
            reads.insert(*index);
        }
    });
    reads
}

/// Locals written anywhere in the tree.
pub fn writes(body: &[Instr]) -> HashSet<u32> {
    let mut writes = HashSet::new();
    walk(body, &mut |instr| {
        if let Instr::LocalSet(index) | Instr::LocalTee(index) = instr {
            writes.insert(*index);
        }
    });
    writes
}

/// Apply `f` to every local index in the tree.
pub fn for_each_local_mut(body: &mut [Instr], f: &mut impl FnMut(&mut u32)) {
    for instr in body {
        match instr {
            Instr::LocalGet(index) | Instr::LocalSet(index) | Instr::LocalTee(index) => f(index),
            _ => {}
        }
        for nested in instr.bodies_mut() {
            for_each_local_mut(nested, f);
        }
    }
}

/// Whether some branch in `body` targets the label `depth` levels out from `body` itself.
pub fn branches_to(body: &[Instr], depth: u32) -> bool {
    body.iter().any(|instr| match instr {
        Instr::Br(d) | Instr::BrIf(d) => *d == depth,
        Instr::BrTable { targets, default } => *default == depth || targets.contains(&depth),
        _ => instr.bodies().iter().any(|nested| branches_to(nested, depth + 1)),
    })
}

/// Adjust branches in `body` that leave it by more than `depth` levels, after a label between
/// `body` and its enclosing labels was added (`delta` 1) or removed (`delta` -1).
pub fn shift_branches(body: &mut [Instr], depth: u32, delta: i32) {
    let shift = |d: &mut u32| {
        if *d >= depth {
            *d = (*d as i64 + delta as i64) as u32;
        }
    };
    for instr in body {
        match instr {
            Instr::Br(d) | Instr::BrIf(d) => shift(d),
            Instr::BrTable { targets, default } => {
                targets.iter_mut().for_each(shift);
                shift(default);
            }
            _ => {
                for nested in instr.bodies_mut() {
                    shift_branches(nested, depth + 1, delta);
                }
            }
        }
    }
}

/// Liveness of locals and the interference between them.
///
/// Two locals interfere when one is written while the other is live. Locals live on entry also
/// interfere with each other, since they hold their initial values at the same time.
#[derive(Debug, Default)]
pub struct Interference {
    edges: BTreeMap<u32, BTreeSet<u32>>,
    pub live_on_entry: BTreeSet<u32>,
}

impl Interference {
    pub fn compute(body: &[Instr]) -> Self {
        let mut interference = Self::default();
        let mut labels = Vec::new();
        let live = interference.sequence(body, BTreeSet::new(), &mut labels);
        for a in &live {
            for b in &live {
                interference.add(*a, *b);
            }
        }
        interference.live_on_entry = live;
        interference
    }

    fn add(&mut self, a: u32, b: u32) {
        if a == b {
            return;
        }
        self.edges.entry(a).or_default().insert(b);
        self.edges.entry(b).or_default().insert(a);
    }

    pub fn interferes(&self, a: u32, b: u32) -> bool {
        self.edges.get(&a).is_some_and(|set| set.contains(&b))
    }

    /// Live-in set of `body` given what is live after it.
    fn sequence(
        &mut self,
        body: &[Instr],
        mut live: BTreeSet<u32>,
        labels: &mut Vec<BTreeSet<u32>>,
    ) -> BTreeSet<u32> {
        let label = |labels: &Vec<BTreeSet<u32>>, depth: u32| -> BTreeSet<u32> {
            labels
                .len()
                .checked_sub(1 + depth as usize)
                .map(|i| labels[i].clone())
                .unwrap_or_default()
        };
        for instr in body.iter().rev() {
            match instr {
                Instr::LocalGet(index) => {
                    live.insert(*index);
                }
                Instr::LocalSet(index) | Instr::LocalTee(index) => {
                    live.remove(index);
                    for other in live.clone() {
                        self.add(*index, other);
                    }
                }
                Instr::Br(depth) => live = label(labels, *depth),
                Instr::BrIf(depth) => live.extend(label(labels, *depth)),
                Instr::BrTable { targets, default } => {
                    live = label(labels, *default);
                    for target in targets {
                        live.extend(label(labels, *target));
                    }
                }
                Instr::Return | Instr::Unreachable => live.clear(),
                Instr::Block { body, .. } => {
                    labels.push(live.clone());
                    live = self.sequence(body, live, labels);
                    labels.pop();
                }
                Instr::Loop { body, .. } => {
                    let mut header = BTreeSet::new();
                    loop {
                        labels.push(header.clone());
                        let entry = self.sequence(body, live.clone(), labels);
                        labels.pop();
                        if entry == header {
                            break;
                        }
                        header = entry;
                    }
                    live = header;
                }
                Instr::If {
                    then, otherwise, ..
                } => {
                    labels.push(live.clone());
                    let mut entry = self.sequence(then, live.clone(), labels);
                    entry.extend(self.sequence(otherwise, live, labels));
                    labels.pop();
                    live = entry;
                }
                _ => {}
            }
        }
        live
    }
}

/// Where a value read from a local may have been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Definition {
    /// The value the local holds on entry: the argument for a parameter, zero otherwise.
    Entry(u32),
    /// The `local.set` or `local.tee` at this position in [`walk`] order.
    Write(usize),
}

/// Reaching definitions of every local read.
#[derive(Debug, Default)]
pub struct ReachingDefinitions {
    /// Definitions reaching each `local.get`, keyed by its position in [`walk`] order.
    pub uses: BTreeMap<usize, BTreeSet<Definition>>,
    /// The local written by each write position.
    pub writes: BTreeMap<usize, u32>,
    /// The local read at each read position.
    pub reads: BTreeMap<usize, u32>,
}

type DefinitionState = BTreeMap<u32, BTreeSet<Definition>>;

fn merge(into: &mut DefinitionState, from: &DefinitionState) {
    for (local, defs) in from {
        into.entry(*local).or_default().extend(defs.iter().copied());
    }
}

/// Record the state flowing along a branch into the label it targets. Branches out of the
/// function body have no label.
fn branch(labels: &mut [DefinitionState], depth: u32, state: &DefinitionState) {
    if let Some(i) = labels.len().checked_sub(1 + depth as usize) {
        merge(&mut labels[i], state);
    }
}

impl ReachingDefinitions {
    pub fn compute(body: &[Instr], local_count: u32) -> Self {
        let mut analysis = Self::default();
        let entry = (0..local_count)
            .map(|i| (i, BTreeSet::from([Definition::Entry(i)])))
            .collect::<DefinitionState>();
        let mut labels = Vec::new();
        let mut position = 0;
        analysis.sequence(body, entry, &mut labels, &mut position);
        analysis
    }

    fn sequence(
        &mut self,
        body: &[Instr],
        mut state: DefinitionState,
        labels: &mut Vec<DefinitionState>,
        position: &mut usize,
    ) -> DefinitionState {
        for instr in body {
            let here = *position;
            *position += 1;
            match instr {
                Instr::LocalGet(index) => {
                    self.reads.insert(here, *index);
                    let defs = state.get(index).cloned().unwrap_or_default();
                    self.uses.entry(here).or_default().extend(defs);
                }
                Instr::LocalSet(index) | Instr::LocalTee(index) => {
                    self.writes.insert(here, *index);
                    state.insert(*index, BTreeSet::from([Definition::Write(here)]));
                }
                Instr::Br(depth) => {
                    branch(labels, *depth, &state);
                    state.clear();
                }
                Instr::BrIf(depth) => branch(labels, *depth, &state),
                Instr::BrTable { targets, default } => {
                    for depth in targets.iter().chain(std::iter::once(default)) {
                        branch(labels, *depth, &state);
                    }
                    state.clear();
                }
                Instr::Return | Instr::Unreachable => state.clear(),
                Instr::Block { body, .. } => {
                    labels.push(DefinitionState::new());
                    let mut out = self.sequence(body, state, labels, position);
                    if let Some(branched) = labels.pop() {
                        merge(&mut out, &branched);
                    }
                    state = out;
                }
                Instr::Loop { body, .. } => {
                    let start = *position;
                    let mut header = state.clone();
                    loop {
                        *position = start;
                        labels.push(DefinitionState::new());
                        let out = self.sequence(body, header.clone(), labels, position);
                        let back = labels.pop().unwrap_or_default();
                        let mut next = header.clone();
                        merge(&mut next, &back);
                        if next == header {
                            state = out;
                            break;
                        }
                        header = next;
                    }
                }
                Instr::If {
                    then, otherwise, ..
                } => {
                    labels.push(DefinitionState::new());
                    let mut out = self.sequence(then, state.clone(), labels, position);
                    let other = self.sequence(otherwise, state, labels, position);
                    merge(&mut out, &other);
                    if let Some(branched) = labels.pop() {
                        merge(&mut out, &branched);
                    }
                    state = out;
                }
                _ => {}
            }
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cwasm_wasm::instr::BinaryOp;
    use cwasm_wasm::{BlockType, ValType};

    #[test]
    fn test_value_start_covers_one_operand() {
        let body = vec![
            Instr::LocalGet(0),
            Instr::LocalGet(1),
            Instr::I32Const(2),
            Instr::Binary(ValType::I32, BinaryOp::Mul),
            Instr::Drop,
        ];
        assert_eq!(value_start(&body, 4), Some(1));
        assert_eq!(value_start(&body, 1), Some(0));
    }

    #[test]
    fn test_branch_depths() {
        let inner = vec![Instr::Br(1)];
        let body = vec![Instr::Block {
            ty: BlockType::Empty,
            body: inner,
        }];
        assert!(branches_to(&body, 0));
        assert!(!branches_to(&body, 1));
        let mut shifted = body.clone();
        shift_branches(&mut shifted, 0, -1);
        assert_eq!(
            shifted,
            vec![Instr::Block {
                ty: BlockType::Empty,
                body: vec![Instr::Br(0)]
            }]
        );
    }

    #[test]
    fn test_loop_carried_locals_interfere() {
        // local 0 counts down while local 1 accumulates; both stay live around the loop.
        let body = vec![Instr::Loop {
            ty: BlockType::Empty,
            body: vec![
                Instr::LocalGet(1),
                Instr::LocalGet(0),
                Instr::Binary(ValType::I32, BinaryOp::Add),
                Instr::LocalSet(1),
                Instr::LocalGet(0),
                Instr::I32Const(1),
                Instr::Binary(ValType::I32, BinaryOp::Sub),
                Instr::LocalTee(0),
                Instr::BrIf(0),
            ],
        }];
        let interference = Interference::compute(&body);
        assert!(interference.interferes(0, 1));
        assert!(interference.live_on_entry.contains(&0));
    }

    #[test]
    fn test_reaching_definitions_merge_at_loop_header() {
        let body = vec![
            Instr::I32Const(0),
            Instr::LocalSet(0),
            Instr::Loop {
                ty: BlockType::Empty,
                body: vec![
                    Instr::LocalGet(0),
                    Instr::I32Const(1),
                    Instr::Binary(ValType::I32, BinaryOp::Add),
                    Instr::LocalTee(0),
                    Instr::BrIf(0),
                ],
            },
        ];
        let reaching = ReachingDefinitions::compute(&body, 1);
        // Walk positions: 0 const, 1 set, 2 loop, 3 get, 4 const, 5 add, 6 tee, 7 br_if.
        let defs = reaching.uses.get(&3).cloned().unwrap_or_default();
        assert_eq!(
            defs,
            BTreeSet::from([Definition::Write(1), Definition::Write(6)])
        );
    }
}
