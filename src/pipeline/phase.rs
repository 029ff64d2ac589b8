//! Phase join/split and conflict resolution (spec.md §4.11).

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::assembly::{Assembly, OptionalOffset};
use crate::dna::Seq;
use crate::pipeline::{ExpectedOrder, Stage};

/// Arena of component assemblies a [`PhaseJoiner`] has folded into a
/// joined record, keyed by the component's original `assembly_id`;
/// shared with a [`PhaseSplitter`] so `join ∘ split` can restore each
/// component's own `seq`, offsets, and evidence rather than only its id
/// (spec.md §4.11, §8 R3; design §9.1's "arena/`NodeId`" resolution).
pub type PhaseArena = Rc<RefCell<BTreeMap<u64, Assembly>>>;

pub fn new_phase_arena() -> PhaseArena {
    Rc::new(RefCell::new(BTreeMap::new()))
}

struct ActivePhase {
    joined: Assembly,
    ref_right: i64,
    variant_right: i64,
}

/// Concatenates consecutive assemblies sharing at least one `phase_id`
/// into a single joined assembly, tracking one [`ActivePhase`] per
/// phase id. An incoming assembly extends every active phase it
/// belongs to (splitting actives when only a subset of a joined group's
/// ids match), or aborts and force-emits an active phase when it is too
/// large or reuses an id non-contiguously.
pub struct PhaseJoiner<S: Stage> {
    downstream: S,
    max_phase_len: i64,
    max_phase_asm_len: usize,
    active: BTreeMap<String, ActivePhase>,
    aborted_until: BTreeMap<String, i64>,
    arena: PhaseArena,
}

impl<S: Stage> PhaseJoiner<S> {
    pub fn new(downstream: S, max_phase_len: i64, max_phase_asm_len: usize, arena: PhaseArena) -> Self {
        PhaseJoiner {
            downstream,
            max_phase_len,
            max_phase_asm_len,
            active: BTreeMap::new(),
            aborted_until: BTreeMap::new(),
            arena,
        }
    }

    fn abort(&mut self, id: &str, at_offset: i64) {
        if let Some(active) = self.active.remove(id) {
            self.downstream.add(active.joined);
        }
        self.aborted_until.insert(id.to_string(), at_offset);
    }

    fn extend(&mut self, id: &str, a: &Assembly) {
        let entry = self.active.entry(id.to_string()).or_insert_with(|| ActivePhase {
            joined: Assembly::new(a.left_offset, a.right_offset, Seq::new()),
            ref_right: a.left_offset.get(),
            variant_right: a.left_offset.get(),
        });

        let mut bases = entry.joined.seq.bases().to_vec();
        bases.extend_from_slice(a.seq.bases());
        entry.joined.seq = Seq::from_bases(bases);
        entry.joined.sub_assemblies.push(a.assembly_id);
        entry.joined.phase_ids.insert(id.to_string());
        entry.joined.right_offset = a.right_offset;
        entry.ref_right = a.right_offset.get();
        entry.variant_right = a.right_offset.get();

        self.arena.borrow_mut().insert(a.assembly_id, a.clone());
    }
}

impl<S: Stage> Stage for PhaseJoiner<S> {
    fn expected_order(&self) -> ExpectedOrder {
        ExpectedOrder::Canonical
    }

    fn add(&mut self, a: Assembly) {
        if a.phase_ids.is_empty() {
            self.downstream.add(a);
            return;
        }
        let left = a.left_offset.is_present().then(|| a.left_offset.get()).unwrap_or(i64::MIN);

        for id in a.phase_ids.clone() {
            if let Some(&aborted_at) = self.aborted_until.get(&id) {
                if left < aborted_at {
                    continue; // still inside the region that triggered the abort
                }
                self.aborted_until.remove(&id);
            }

            let too_big = a.seq.len() > self.max_phase_asm_len
                || self.active.get(&id).map(|p| left - p.ref_right > self.max_phase_len).unwrap_or(false);
            if too_big {
                self.abort(&id, left);
                continue;
            }
            self.extend(&id, &a);
        }
    }

    fn flush(&mut self) {
        for (_, active) in std::mem::take(&mut self.active) {
            self.downstream.add(active.joined);
        }
        self.downstream.flush();
    }
}

/// Inverse of [`PhaseJoiner`]: emits each joined assembly's
/// `sub_assemblies` in sorted order, resolved back to the original
/// component's own `seq`, offsets, and evidence via the shared
/// [`PhaseArena`] the joiner populated. A sub-assembly id with no arena
/// entry (e.g. a joined record built outside this pipeline instance)
/// falls back to a retagged clone of the joined record so the gap is
/// visible rather than silently wrong.
pub struct PhaseSplitter<S: Stage> {
    downstream: S,
    arena: PhaseArena,
}

impl<S: Stage> PhaseSplitter<S> {
    pub fn new(downstream: S, arena: PhaseArena) -> Self {
        PhaseSplitter { downstream, arena }
    }
}

impl<S: Stage> Stage for PhaseSplitter<S> {
    fn expected_order(&self) -> ExpectedOrder {
        ExpectedOrder::Canonical
    }

    fn add(&mut self, a: Assembly) {
        if a.sub_assemblies.is_empty() {
            self.downstream.add(a);
            return;
        }
        let mut ids = a.sub_assemblies.clone();
        ids.sort_unstable();
        for sub_id in ids {
            match self.arena.borrow_mut().remove(&sub_id) {
                Some(component) => self.downstream.add(component),
                None => {
                    let mut sub = a.clone();
                    sub.assembly_id = sub_id;
                    sub.sub_assemblies.clear();
                    sub.add_tag("phase_split_missing_component");
                    self.downstream.add(sub);
                }
            }
        }
    }

    fn flush(&mut self) {
        self.downstream.flush();
    }
}

/// Walks a right-offset-keyed active list; whenever two simultaneously
/// active assemblies share a phase id, `resolve` is invoked and must
/// mutate the pair so their phase ids no longer overlap.
pub struct PhaseConflictResolver<S: Stage, F: FnMut(&mut Assembly, &mut Assembly) -> bool> {
    downstream: S,
    active: Vec<Assembly>,
    resolve: F,
}

impl<S: Stage, F: FnMut(&mut Assembly, &mut Assembly) -> bool> PhaseConflictResolver<S, F> {
    pub fn new(downstream: S, resolve: F) -> Self {
        PhaseConflictResolver { downstream, active: Vec::new(), resolve }
    }
}

impl<S: Stage, F: FnMut(&mut Assembly, &mut Assembly) -> bool> Stage for PhaseConflictResolver<S, F> {
    fn expected_order(&self) -> ExpectedOrder {
        ExpectedOrder::Canonical
    }

    fn add(&mut self, mut a: Assembly) {
        let left = a.left_offset.is_present().then(|| a.left_offset.get()).unwrap_or(i64::MIN);
        self.active.retain(|existing| {
            existing.right_offset.is_present() && existing.right_offset.get() > left
        });

        for existing in &mut self.active {
            if !existing.phase_ids.is_disjoint(&a.phase_ids) {
                let resolved = (self.resolve)(existing, &mut a);
                debug_assert!(resolved, "phase conflict callback failed to resolve overlapping phase ids");
            }
        }
        self.active.push(a.clone());
        self.downstream.add(a);
    }

    fn flush(&mut self) {
        self.active.clear();
        self.downstream.flush();
    }
}
