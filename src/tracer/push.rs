//! Push tracer: best-first search outward from a reference anchor
//! (spec.md §4.5.1).
//!
//! Grounded in `original_source/modules/variants/`'s push-tracer cost
//! model and `NextPath` priority queue; the incremental `m_position_entries`
//! / `m_entry_positions` read-ahead indices are replaced with direct
//! `Seqset::find` lookups against the accumulated candidate sequence,
//! matching this crate's in-memory-first approach elsewhere (e.g.
//! `refmap`'s brute-force windowed scan in place of the packed walk).

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use crate::assembly::{Assembly, OptionalOffset};
use crate::common::AssembleOptions;
use crate::dna::{Base, Seq};
use crate::pipeline::Stage;
use crate::readmap::Readmap;
use crate::reference::Reference;
use crate::seqset::Seqset;
use crate::tracer::{SeenKey, Tracer};

/// One candidate extension in flight, ordered by accumulated cost (lowest
/// first via `BinaryHeap<Reverse<_>>`).
#[derive(Debug, Clone)]
struct NextPath {
    cost: i64,
    /// Reference position the candidate has reached (exclusive).
    pos: usize,
    seq: Seq,
    steps: u32,
    ambiguous_steps: u32,
    has_variant: bool,
    /// Shortest supporting-read overlap seen along this path so far,
    /// used to detect the "decrease-overlap" cost-model term.
    min_support_len: usize,
}

impl PartialEq for NextPath {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}
impl Eq for NextPath {}
impl PartialOrd for NextPath {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for NextPath {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.cost.cmp(&other.cost)
    }
}

pub struct PushTracer<'a> {
    pub seqset: &'a Seqset,
    pub readmap: &'a Readmap,
    pub reference: &'a Reference,
    pub options: &'a AssembleOptions,
    pub scaffold_id: usize,
    pub start: usize,
    pub end: usize,
}

impl<'a> Tracer for PushTracer<'a> {
    fn trace(&self, output: &mut dyn Stage, cancel: &AtomicBool) {
        for anchor in self.start..self.end {
            if cancel.load(AtomicOrdering::Relaxed) {
                return;
            }
            self.trace_from(anchor, output);
        }
    }
}

impl<'a> PushTracer<'a> {
    /// Length of the leading run of `seq` that matches the reference
    /// starting at `anchor` — the anchor length a rejoin candidate can
    /// claim on its left (spec.md §4.5.1 "computed ... anchor lengths").
    fn matching_prefix_len(&self, anchor: usize, seq: &Seq) -> u32 {
        let mut n = 0u32;
        for i in 0..seq.len() {
            let Some(ref_base) = self.reference.base_at(self.reference.flatten(self.scaffold_id, anchor + i)) else {
                break;
            };
            if seq.get(i) != ref_base {
                break;
            }
            n += 1;
        }
        n
    }

    /// Emits a rejoin/dead-end candidate with its anchor lengths and
    /// `min_overlap` populated, per spec.md §4.5.1.
    fn emit(&self, anchor: usize, candidate: &NextPath, tag: &'static str, output: &mut dyn Stage) {
        let left_offset = self.reference.flatten(self.scaffold_id, anchor) as i64;
        let right_offset = self.reference.flatten(self.scaffold_id, candidate.pos) as i64;
        let mut a = Assembly::new(OptionalOffset::some(left_offset), OptionalOffset::some(right_offset), candidate.seq.clone());
        a.left_anchor_len = self.matching_prefix_len(anchor, &candidate.seq).min(candidate.seq.len() as u32);
        a.right_anchor_len = 0;
        a.min_overlap = candidate.min_support_len.min(candidate.seq.len()) as u32;
        a.score = candidate.cost;
        a.add_tag("push_tracer");
        a.add_tag(tag);
        output.add(a);
    }

    fn trace_from(&self, anchor: usize, output: &mut dyn Stage) {
        let opts = self.options;
        let scaffold_len = self.reference.scaffolds[self.scaffold_id].len;
        let max_reach = opts.scaffold_split_size.min(scaffold_len.saturating_sub(anchor));
        if max_reach == 0 {
            return;
        }

        let mut heap = BinaryHeap::new();
        let mut seen: BTreeSet<SeenKey> = BTreeSet::new();
        heap.push(Reverse(NextPath {
            cost: 0,
            pos: anchor,
            seq: Seq::new(),
            steps: 0,
            ambiguous_steps: 0,
            has_variant: false,
            min_support_len: usize::MAX,
        }));

        while let Some(Reverse(candidate)) = heap.pop() {
            if candidate.steps as usize > opts.max_search_steps || candidate.ambiguous_steps as usize > opts.max_ambiguous_search_steps {
                continue;
            }
            let reached = candidate.pos - anchor;
            if reached >= max_reach {
                if candidate.has_variant {
                    let mut dead_end = candidate.clone();
                    dead_end.cost += opts.push_dead_end_penalty;
                    self.emit(anchor, &dead_end, "push_dead_end", output);
                }
                continue;
            }
            let ref_base = self.reference.base_at(self.reference.flatten(self.scaffold_id, candidate.pos));

            // Rejoin candidate: a substitution relative to reference that
            // is supported by the seqset, i.e. appears as a read/suffix of
            // sufficient length.
            for alt in Base::ALL {
                let mut next_seq = candidate.seq.clone();
                next_seq.push(alt);
                let range = self.seqset.find(next_seq.as_slice());
                if !range.is_valid() {
                    continue;
                }
                let supporting: Vec<_> = self.readmap.get_prefix_reads(range, opts.min_overlap).collect();
                if supporting.is_empty() {
                    continue;
                }

                let seen_key = SeenKey { offset: (candidate.pos + 1) as i64, seqset_id: range.begin() };
                let revisit = !seen.insert(seen_key);

                let is_ambiguous_ref = ref_base.is_none();
                let is_match = ref_base == Some(alt);
                let mut extra_cost = if is_match { opts.push_traverse_reference_cost } else { opts.push_mismatch_penalty };
                if is_ambiguous_ref {
                    extra_cost += opts.push_ambiguous_penalty;
                }
                if revisit {
                    extra_cost += opts.push_loop_penalty;
                }

                let support_len = supporting.iter().map(|r| r.len).min().unwrap_or(0);
                if support_len < candidate.min_support_len {
                    extra_cost += opts.push_decrease_overlap_penalty;
                }
                if supporting.iter().any(|r| self.readmap.get_mate(r.read_id).is_some()) {
                    extra_cost += opts.push_pair_match_bonus;
                }

                let next = NextPath {
                    cost: candidate.cost + extra_cost,
                    pos: candidate.pos + 1,
                    seq: next_seq,
                    steps: candidate.steps + 1,
                    ambiguous_steps: candidate.ambiguous_steps + if is_ambiguous_ref { 1 } else { 0 },
                    has_variant: candidate.has_variant || !is_match,
                    min_support_len: candidate.min_support_len.min(support_len),
                };

                if !is_match && next.seq.len() >= opts.min_overlap {
                    self.emit(anchor, &next, "push_rejoin", output);
                }

                heap.push(Reverse(next));
            }

            if heap.len() > opts.max_next_paths {
                let mut kept: Vec<Reverse<NextPath>> = heap.into_vec();
                kept.sort_by(|a, b| a.0.cost.cmp(&b.0.cost));
                kept.truncate(opts.max_next_paths);
                heap = kept.into_iter().collect();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::AssembleOptionsBuilder;
    use crate::pipeline::ExpectedOrder;
    use crate::testutil::{build_readmap, build_seqset, tseq, tseq_reference};
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

    #[test]
    fn discovers_a_homozygous_substitution() {
        let reference = tseq_reference("abcdefghij");
        let ref_seq = tseq("abcdefghij");
        // Flip one base in the middle to a distinct base so the seqset
        // carries read support for the substitution.
        let flip_pos = 6;
        let alt_base = Base::ALL.into_iter().find(|&b| b != ref_seq.get(flip_pos)).unwrap();
        let mut bases: Vec<Base> = ref_seq.bases().to_vec();
        bases[flip_pos] = alt_base;
        let alt_seq = Seq::from_bases(bases);

        let reads = vec![alt_seq.clone(), alt_seq.subseq(2..alt_seq.len())];
        let seqset = build_seqset(&reads);
        let readmap = build_readmap(&[(reads[0].clone(), reads[1].clone())], &seqset);
        let options = AssembleOptionsBuilder::default().min_overlap(2usize).build().unwrap();

        let tracer = PushTracer {
            seqset: &seqset,
            readmap: &readmap,
            reference: &reference,
            options: &options,
            scaffold_id: 0,
            start: 0,
            end: reference.scaffolds[0].len,
        };
        let mut out = Collector(Vec::new());
        tracer.trace(&mut out, &AtomicBool::new(false));
        assert!(out.0.iter().any(|a| a.seq.get(a.seq.len() - 1) == alt_base));
    }

    #[test]
    fn rejoin_candidates_carry_anchor_lengths_and_min_overlap() {
        let reference = tseq_reference("abcdefghij");
        let ref_seq = tseq("abcdefghij");
        let flip_pos = 6;
        let alt_base = Base::ALL.into_iter().find(|&b| b != ref_seq.get(flip_pos)).unwrap();
        let mut bases: Vec<Base> = ref_seq.bases().to_vec();
        bases[flip_pos] = alt_base;
        let alt_seq = Seq::from_bases(bases);

        let reads = vec![alt_seq.clone(), alt_seq.subseq(2..alt_seq.len())];
        let seqset = build_seqset(&reads);
        let readmap = build_readmap(&[(reads[0].clone(), reads[1].clone())], &seqset);
        let options = AssembleOptionsBuilder::default().min_overlap(2usize).build().unwrap();

        let tracer = PushTracer {
            seqset: &seqset,
            readmap: &readmap,
            reference: &reference,
            options: &options,
            scaffold_id: 0,
            start: 0,
            end: reference.scaffolds[0].len,
        };
        let mut out = Collector(Vec::new());
        tracer.trace(&mut out, &AtomicBool::new(false));

        let rejoin = out.0.iter().find(|a| a.tags.contains("push_rejoin")).expect("at least one rejoin candidate");
        assert!(rejoin.min_overlap > 0);
        assert_eq!(rejoin.right_anchor_len, 0);
        assert!(rejoin.left_anchor_len as usize <= rejoin.seq.len());
    }
}
