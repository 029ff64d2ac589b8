//! Ref-trimmer, deduper, and exact-deduper stages (spec.md §4.9).

use std::collections::BTreeMap;

use crate::assembly::{Assembly, OptionalOffset};
use crate::pipeline::{ExpectedOrder, Stage};
use crate::reference::Reference;

/// Strips leading/trailing bases that match the reference exactly,
/// shrinking offsets and anchor lengths to match; an assembly trimmed
/// down to nothing becomes `matches_reference = true`.
pub struct RefTrimmer<'a, S: Stage> {
    downstream: S,
    reference: &'a Reference,
}

impl<'a, S: Stage> RefTrimmer<'a, S> {
    pub fn new(downstream: S, reference: &'a Reference) -> Self {
        RefTrimmer { downstream, reference }
    }

    fn trim(&self, mut a: Assembly) -> Assembly {
        if a.matches_reference {
            return a;
        }
        let (Some(mut left), Some(mut right)) =
            (a.left_offset.is_present().then(|| a.left_offset.get()), a.right_offset.is_present().then(|| a.right_offset.get()))
        else {
            return a;
        };
        let mut bases = a.seq.bases().to_vec();

        while !bases.is_empty() && (left as usize) < right as usize {
            let Some(ref_base) = self.reference.base_at(left as usize) else { break };
            if bases[0] != ref_base {
                break;
            }
            bases.remove(0);
            left += 1;
        }
        while !bases.is_empty() && (left as usize) < right as usize {
            let Some(ref_base) = self.reference.base_at(right as usize - 1) else { break };
            if *bases.last().unwrap() != ref_base {
                break;
            }
            bases.pop();
            right -= 1;
        }

        a.left_offset = OptionalOffset::some(left);
        a.right_offset = OptionalOffset::some(right);
        a.seq = crate::dna::Seq::from_bases(bases);
        if a.seq.is_empty() && (right - left) == 0 {
            a.matches_reference = true;
        }
        a
    }
}

impl<'a, S: Stage> Stage for RefTrimmer<'a, S> {
    fn expected_order(&self) -> ExpectedOrder {
        self.downstream.expected_order()
    }

    fn add(&mut self, a: Assembly) {
        self.downstream.add(self.trim(a));
    }

    fn flush(&mut self) {
        self.downstream.flush();
    }
}

fn variant_key(a: &Assembly) -> (i64, i64, Vec<crate::dna::Base>) {
    (a.left_offset.get(), a.right_offset.get(), a.seq.bases().to_vec())
}

fn merge_into(target: &mut Assembly, other: Assembly) {
    target.merged_assembly_ids.push(other.assembly_id);
    target.merged_assembly_ids.extend(other.merged_assembly_ids);
    target.left_pair_matches.extend(other.left_pair_matches);
    target.left_pair_matches.sort_unstable();
    target.left_pair_matches.dedup();
    target.right_pair_matches.extend(other.right_pair_matches);
    target.right_pair_matches.sort_unstable();
    target.right_pair_matches.dedup();
    target.rc_read_ids.extend(other.rc_read_ids);
    target.tags.extend(other.tags);
}

/// Merges assemblies whose non-anchor variant content (span + sequence)
/// is identical, combining pair-match sets and `merged_assembly_ids`.
/// Requires `Canonical`-ordered input since it only needs to compare
/// against assemblies still in its small pending window.
pub struct Deduper<S: Stage> {
    downstream: S,
    pending: BTreeMap<(i64, i64, Vec<crate::dna::Base>), Assembly>,
    last_right: i64,
}

impl<S: Stage> Deduper<S> {
    pub fn new(downstream: S) -> Self {
        Deduper { downstream, pending: BTreeMap::new(), last_right: i64::MIN }
    }

    fn flush_ready(&mut self, floor: i64) {
        let ready: Vec<_> = self
            .pending
            .iter()
            .filter(|(k, _)| k.0 < floor)
            .map(|(k, _)| k.clone())
            .collect();
        for key in ready {
            if let Some(a) = self.pending.remove(&key) {
                self.downstream.add(a);
            }
        }
    }
}

impl<S: Stage> Stage for Deduper<S> {
    fn expected_order(&self) -> ExpectedOrder {
        ExpectedOrder::Canonical
    }

    fn add(&mut self, a: Assembly) {
        let key = variant_key(&a);
        if a.right_offset.is_present() {
            self.last_right = self.last_right.max(a.right_offset.get());
        }
        match self.pending.remove(&key) {
            Some(mut existing) => {
                merge_into(&mut existing, a);
                self.pending.insert(key, existing);
            }
            None => {
                self.pending.insert(key, a);
            }
        }
        self.flush_ready(self.last_right);
    }

    fn flush(&mut self) {
        for (_, a) in std::mem::take(&mut self.pending) {
            self.downstream.add(a);
        }
        self.downstream.flush();
    }
}

/// Merges only byte-identical assemblies (same offsets, same seq, same
/// tags): a cheaper, order-independent pass suitable right after the
/// tracers emit duplicate discoveries.
#[derive(Default)]
pub struct ExactDeduper<S: Stage> {
    downstream: S,
    seen: BTreeMap<(i64, i64, Vec<crate::dna::Base>), Assembly>,
}

impl<S: Stage> ExactDeduper<S> {
    pub fn new(downstream: S) -> Self {
        ExactDeduper { downstream, seen: BTreeMap::new() }
    }
}

impl<S: Stage> Stage for ExactDeduper<S> {
    fn expected_order(&self) -> ExpectedOrder {
        ExpectedOrder::Canonical
    }

    fn add(&mut self, a: Assembly) {
        let key = variant_key(&a);
        match self.seen.remove(&key) {
            Some(mut existing) => {
                merge_into(&mut existing, a);
                self.seen.insert(key, existing);
            }
            None => {
                self.seen.insert(key, a);
            }
        }
    }

    fn flush(&mut self) {
        for (_, a) in std::mem::take(&mut self.seen) {
            self.downstream.add(a);
        }
        self.downstream.flush();
    }
}
