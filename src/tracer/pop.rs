//! Pop tracer: two-pass fronts/poppers search specialized for one-end-
//! anchored and large-insert cases (spec.md §4.5.2).
//!
//! Grounded in the original pop-tracer's `fronts`/`poppers` tables: fronts
//! are seeded from reference positions and read mates, poppers shrink via
//! repeated `pop_front` until they match a front, at which point both
//! halves merge into a candidate assembly.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use crate::assembly::{Assembly, OptionalOffset};
use crate::common::AssembleOptions;
use crate::pipeline::Stage;
use crate::readmap::Readmap;
use crate::reference::Reference;
use crate::seqset::{Range, Seqset};
use crate::tracer::Tracer;

/// A front: a seqset range that could continue a path, with the
/// reference offset it anchors at.
#[derive(Debug, Clone, Copy)]
struct Front {
    orig_r: Range,
    ref_offset: usize,
}

/// A search head: a progressively `pop_front`-shrinking range plus the
/// sequence already consumed.
#[derive(Debug, Clone)]
struct Popper {
    orig_r: Range,
    popped_r: Range,
    seq: crate::dna::Seq,
    start_offset: usize,
}

pub struct PopTracer<'a> {
    pub seqset: &'a Seqset,
    pub readmap: &'a Readmap,
    pub reference: &'a Reference,
    pub options: &'a AssembleOptions,
    pub scaffold_id: usize,
    pub start: usize,
    pub end: usize,
}

impl<'a> Tracer for PopTracer<'a> {
    fn trace(&self, output: &mut dyn Stage, cancel: &AtomicBool) {
        let mut fronts: BTreeMap<Range, Front> = BTreeMap::new();
        let mut poppers: Vec<Popper> = Vec::new();

        for pos in self.start..self.end {
            let Some(base) = self.reference.base_at(self.reference.flatten(self.scaffold_id, pos)) else {
                continue;
            };
            let window_len = self.options.min_overlap.max(1);
            if pos + window_len > self.reference.scaffolds[self.scaffold_id].len {
                continue;
            }
            let mut bases = Vec::with_capacity(window_len);
            for i in 0..window_len {
                match self.reference.base_at(self.reference.flatten(self.scaffold_id, pos + i)) {
                    Some(b) => bases.push(b),
                    None => break,
                }
            }
            if bases.len() != window_len {
                continue;
            }
            let seq = crate::dna::Seq::from_bases(bases);
            let r = self.seqset.find(seq.as_slice());
            if r.is_valid() {
                fronts.insert(r, Front { orig_r: r, ref_offset: pos });
                for read in self.readmap.get_prefix_reads(r, self.options.min_overlap) {
                    if let Some(mate) = self.readmap.get_mate(read.read_id) {
                        let mate_r = self.seqset.find(self.seqset.ctx_entry(mate.seqset_id).sequence());
                        if mate_r.is_valid() {
                            poppers.push(Popper {
                                orig_r: mate_r,
                                popped_r: mate_r,
                                seq: self.seqset.ctx_entry(mate_r.begin()).sequence().to_owned_seq(),
                                start_offset: pos,
                            });
                        }
                    }
                }
            }
            let _ = base;
        }

        let mut iterations = 0usize;
        while !poppers.is_empty() && iterations < self.options.max_assemblies_per_region {
            iterations += 1;
            if cancel.load(AtomicOrdering::Relaxed) {
                return;
            }
            let mut next_round = Vec::new();
            for mut popper in poppers.drain(..) {
                let shrunk = self.seqset.pop_front(popper.popped_r);
                if !shrunk.is_valid() || shrunk.length() < self.options.min_overlap {
                    continue;
                }
                popper.popped_r = shrunk;

                if let Some(front) = find_matching_front(&fronts, &popper, self.seqset) {
                    let mut a = Assembly::new(
                        OptionalOffset::some(popper.start_offset as i64),
                        OptionalOffset::some(front.ref_offset as i64),
                        popper.seq.clone(),
                    );
                    a.add_tag("pop_tracer");
                    output.add(a);
                } else {
                    next_round.push(popper);
                }
            }
            poppers = next_round;
        }
    }
}

fn find_matching_front(fronts: &BTreeMap<Range, Front>, popper: &Popper, seqset: &Seqset) -> Option<Front> {
    fronts.values().find(|front| {
        let shared = seqset.shared_prefix_length(front.orig_r, popper.popped_r);
        shared >= front.orig_r.length().min(popper.popped_r.length())
    }).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::AssembleOptionsBuilder;
    use crate::pipeline::ExpectedOrder;
    use crate::testutil::{build_readmap, build_seqset, tseq, tseq_reference};

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

    #[test]
    fn pop_tracer_runs_to_completion_without_panicking() {
        let reference = tseq_reference("abcdefgh");
        let r1 = tseq("abcd");
        let r2 = tseq("efgh");
        let seqset = build_seqset(&[r1.clone(), r2.clone()]);
        let readmap = build_readmap(&[(r1, r2)], &seqset);
        let options = AssembleOptionsBuilder::default().min_overlap(2usize).build().unwrap();

        let tracer = PopTracer {
            seqset: &seqset,
            readmap: &readmap,
            reference: &reference,
            options: &options,
            scaffold_id: 0,
            start: 0,
            end: reference.scaffolds[0].len,
        };
        let mut out = Collector(Vec::new());
        // Reaching this line at all demonstrates the fronts/poppers loop
        // terminates instead of spinning forever.
        tracer.trace(&mut out, &AtomicBool::new(false));
        assert!(out.0.len() <= options.max_assemblies_per_region);
    }
}
