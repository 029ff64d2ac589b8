//! `ploid_limiter` and `rvg_exclude` (spec.md §4.10).

use crate::assembly::Assembly;
use crate::pipeline::{ExpectedOrder, Stage};

/// Keeps a window of active assemblies keyed on right offset; within any
/// set of mutually-overlapping assemblies it greedily keeps the
/// highest-scoring ones until no reference point is covered by more than
/// `max_ploids` active variants. Discarded assemblies are reported
/// through `on_discard` rather than silently dropped.
pub struct PloidLimiter<S: Stage> {
    downstream: S,
    max_ploids: usize,
    active: Vec<Assembly>,
    on_discard: Box<dyn FnMut(&Assembly) + Send>,
}

impl<S: Stage> PloidLimiter<S> {
    pub fn new(downstream: S, max_ploids: usize) -> Self {
        PloidLimiter { downstream, max_ploids, active: Vec::new(), on_discard: Box::new(|_| {}) }
    }

    pub fn with_discard_handler(mut self, on_discard: impl FnMut(&Assembly) + Send + 'static) -> Self {
        self.on_discard = Box::new(on_discard);
        self
    }

    fn retire_non_overlapping(&mut self, left: i64) {
        let mut remaining = Vec::new();
        for a in self.active.drain(..) {
            if a.right_offset.is_present() && a.right_offset.get() <= left {
                self.downstream.add(a);
            } else {
                remaining.push(a);
            }
        }
        self.active = remaining;
    }

    fn overlap_count_at(&self, left: i64, right: i64) -> usize {
        self.active
            .iter()
            .filter(|a| {
                a.left_offset.is_present()
                    && a.right_offset.is_present()
                    && a.left_offset.get() < right
                    && a.right_offset.get() > left
            })
            .count()
    }
}

impl<S: Stage> Stage for PloidLimiter<S> {
    fn expected_order(&self) -> ExpectedOrder {
        ExpectedOrder::Canonical
    }

    fn add(&mut self, a: Assembly) {
        if !a.left_offset.is_present() || !a.right_offset.is_present() {
            self.active.push(a);
            return;
        }
        let (left, right) = (a.left_offset.get(), a.right_offset.get());
        self.retire_non_overlapping(left);

        if self.overlap_count_at(left, right) < self.max_ploids {
            self.active.push(a);
            return;
        }

        // At capacity: discard the lowest scorer among the overlap set
        // plus the incoming candidate.
        let worst_idx = self
            .active
            .iter()
            .enumerate()
            .filter(|(_, other)| {
                other.left_offset.is_present()
                    && other.right_offset.is_present()
                    && other.left_offset.get() < right
                    && other.right_offset.get() > left
            })
            .min_by_key(|(_, other)| other.score)
            .map(|(i, _)| i);

        match worst_idx {
            Some(idx) if self.active[idx].score < a.score => {
                let discarded = self.active.remove(idx);
                (self.on_discard)(&discarded);
                self.active.push(a);
            }
            _ => {
                (self.on_discard)(&a);
            }
        }
    }

    fn flush(&mut self) {
        for a in std::mem::take(&mut self.active) {
            self.downstream.add(a);
        }
        self.downstream.flush();
    }
}

/// Suppresses small non-structural variants with zero pair coverage
/// anywhere in their span, unless the same `assembly_id` has already
/// been emitted as part of a structural variant (tracked via
/// `sv_assembly_ids`).
pub struct RvgExclude<S: Stage> {
    downstream: S,
    sv_size_threshold: usize,
    sv_assembly_ids: std::collections::BTreeSet<u64>,
}

impl<S: Stage> RvgExclude<S> {
    pub fn new(downstream: S, sv_size_threshold: usize) -> Self {
        RvgExclude { downstream, sv_size_threshold, sv_assembly_ids: std::collections::BTreeSet::new() }
    }

    fn is_structural(&self, a: &Assembly) -> bool {
        let ref_span = match (a.left_offset.is_present(), a.right_offset.is_present()) {
            (true, true) => (a.right_offset.get() - a.left_offset.get()) as usize,
            _ => 0,
        };
        ref_span >= self.sv_size_threshold || a.seq.len() >= self.sv_size_threshold
    }
}

impl<S: Stage> Stage for RvgExclude<S> {
    fn expected_order(&self) -> ExpectedOrder {
        self.downstream.expected_order()
    }

    fn add(&mut self, a: Assembly) {
        if self.is_structural(&a) {
            self.sv_assembly_ids.insert(a.assembly_id);
            self.downstream.add(a);
            return;
        }
        let zero_pair_coverage = !a.pair_coverage.is_empty() && a.pair_coverage.iter().all(|&c| c == 0);
        if zero_pair_coverage && !self.sv_assembly_ids.contains(&a.assembly_id) {
            return;
        }
        self.downstream.add(a);
    }

    fn flush(&mut self) {
        self.downstream.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::OptionalOffset;
    use crate::dna::Seq;
    use pretty_assertions::assert_eq;

    struct Collector(Vec<Assembly>);
    impl Stage for Collector {
        fn expected_order(&self) -> ExpectedOrder {
            ExpectedOrder::Canonical
        }
        fn add(&mut self, a: Assembly) {
            self.0.push(a);
        }
        fn flush(&mut self) {}
    }

    fn asm(left: i64, right: i64, score: i64) -> Assembly {
        let mut a = Assembly::new(OptionalOffset::some(left), OptionalOffset::some(right), Seq::new());
        a.score = score;
        a
    }

    #[test]
    fn ploid_limiter_keeps_the_highest_scoring_overlap() {
        let mut limiter = PloidLimiter::new(Collector(Vec::new()), 1);
        limiter.add(asm(0, 10, 5));
        limiter.add(asm(0, 10, 9));
        limiter.flush();
        assert_eq!(limiter.downstream.0.len(), 1);
        assert_eq!(limiter.downstream.0[0].score, 9);
    }

    #[test]
    fn rvg_exclude_drops_zero_pair_coverage_small_variants() {
        let mut a = asm(0, 1, 0);
        a.pair_coverage = vec![0, 0];
        let mut excluder = RvgExclude::new(Collector(Vec::new()), 20);
        excluder.add(a);
        excluder.flush();
        assert!(excluder.downstream.0.is_empty());
    }
}
