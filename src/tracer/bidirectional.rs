//! Bidirectional graph-discover tracer (spec.md §4.5.3), the largest of
//! the three discovery engines.
//!
//! Grounded in `original_source/modules/graph_discover/discover.h`'s
//! `graph_discover` base (an `active_assembly` graph scheduled by
//! offset-keyed queues, `m_readahead_done`/`m_trace_pending` ordered by
//! `min`/`max(right_offset, left_offset)`) plus `branch.h`'s
//! `branch_discover` and `push_to_pair.h`'s `push_to_pair_discover`
//! extensions. This port collapses the class hierarchy into one tracer
//! that runs both extensions over a single forward sweep:
//! [`ActiveNode`] stands in for `active_assembly`, the single `queue`
//! keyed by `cur_offset` (`min(right_offset, left_offset)` while still
//! growing) stands in for `m_readahead_done`/`m_trace_pending`, and
//! `m_mates` is the refcounted pair-discovery table from
//! `push_to_pair.h`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use crate::assembly::{Assembly, OptionalOffset, RangeSet, SeqsetPath};
use crate::common::AssembleOptions;
use crate::dna::{Base, Seq};
use crate::pipeline::Stage;
use crate::readmap::Readmap;
use crate::reference::Reference;
use crate::seqset::{Range, Seqset};
use crate::tracer::Tracer;

pub struct BidirectionalTracer<'a> {
    pub seqset: &'a Seqset,
    pub readmap: &'a Readmap,
    pub reference: &'a Reference,
    pub options: &'a AssembleOptions,
    pub scaffold_id: usize,
    pub start: usize,
    pub end: usize,
}

/// A node of the active-assembly graph: a branch away from the
/// reference spine that hasn't yet resolved into a rejoin or been
/// abandoned. `branch_offset` is fixed at creation; `cur_offset` is the
/// reference position the node's trace frontier has reached.
struct ActiveNode {
    branch_offset: usize,
    cur_offset: usize,
    seq: Seq,
    tag: &'static str,
    /// `true` for a pure insertion (no reference consumed, `cur_offset
    /// == branch_offset` throughout) vs. a deletion/substitution branch
    /// that also advances across reference.
    is_insertion: bool,
    /// Whether this node's supporting reads have already been fed into
    /// `m_mates` (done exactly once, the first time the node is
    /// processed out of the queue).
    mates_registered: bool,
}

impl<'a> Tracer for BidirectionalTracer<'a> {
    fn trace(&self, output: &mut dyn Stage, cancel: &AtomicBool) {
        if !self.options.enable_bidirectional {
            return;
        }
        Engine::new(self).run(output, cancel);
    }
}

/// Runs one sweep of the active-assembly graph over `[start, end)`.
/// Built fresh per `trace()` call so a tracer instance stays `&self` and
/// reusable across scaffold chunks, matching the other two tracers'
/// shape.
struct Engine<'a, 'b> {
    t: &'b BidirectionalTracer<'a>,
    window: usize,
    /// All pending active-assembly nodes, keyed by the reference offset
    /// their trace frontier will next reach. Stands in for the
    /// original's two queues: draining a key fully before moving to the
    /// next offset lets a node requeued at the very key being drained
    /// (an insertion whose branch point and first trace step coincide)
    /// still get processed in the same sweep position instead of being
    /// silently skipped.
    queue: BTreeMap<usize, Vec<ActiveNode>>,
    /// Refcounted table of mates expected to show up as the trace
    /// advances (`push_to_pair_discover::m_mates`).
    m_mates: BTreeMap<Range, i32>,
    /// When each mate range expires out of `m_mates`.
    mate_expiry: BTreeMap<usize, RangeSet>,
}

impl<'a, 'b> Engine<'a, 'b> {
    fn new(t: &'b BidirectionalTracer<'a>) -> Self {
        Engine {
            t,
            window: t.options.min_overlap.max(1),
            queue: BTreeMap::new(),
            m_mates: BTreeMap::new(),
            mate_expiry: BTreeMap::new(),
        }
    }

    fn run(&mut self, output: &mut dyn Stage, cancel: &AtomicBool) {
        let scaffold_len = self.t.reference.scaffolds[self.t.scaffold_id].len;
        let last = self.t.end.min(scaffold_len).saturating_sub(self.window);

        let mut trace_offset = self.t.start;
        while trace_offset <= last {
            if cancel.load(AtomicOrdering::Relaxed) {
                return;
            }
            self.expire_mates(trace_offset);
            self.drain_ready(trace_offset, output);
            self.branch_discover(trace_offset);
            self.drain_ready(trace_offset, output);
            trace_offset += 1;
        }

        for (_, nodes) in std::mem::take(&mut self.queue) {
            for node in nodes {
                self.emit_unresolved(node, output);
            }
        }
    }

    fn expire_mates(&mut self, offset: usize) {
        if let Some(expiring) = self.mate_expiry.remove(&offset) {
            for r in expiring {
                if let Some(count) = self.m_mates.get_mut(&r) {
                    *count -= 1;
                    if *count <= 0 {
                        self.m_mates.remove(&r);
                    }
                }
            }
        }
    }

    /// Processes every node currently queued at `offset`, looping so a
    /// node requeued back onto the same key (see [`Engine::queue`]'s
    /// doc) is drained too rather than stranded until the sweep moves
    /// on and never returns to this key.
    fn drain_ready(&mut self, offset: usize, output: &mut dyn Stage) {
        loop {
            let Some(nodes) = self.queue.remove(&offset) else { return };
            if nodes.is_empty() {
                return;
            }
            for mut node in nodes {
                if !node.mates_registered {
                    self.push_to_pair_discover(&node, offset);
                    node.mates_registered = true;
                }
                if let Some(matched) = self.find_pair_anchor(&node) {
                    self.emit_pair_discovered(&node, matched, output);
                    continue;
                }
                self.extend_or_drop(node, output);
            }
        }
    }

    /// `push_to_pair_discover` extension: registers every mate of a
    /// read supporting this node's current context into the refcounted
    /// `m_mates` table, to expire after `max_pair_distance` bases.
    fn push_to_pair_discover(&mut self, node: &ActiveNode, offset: usize) {
        let range = self.t.seqset.find(node.seq.as_slice());
        if !range.is_valid() {
            return;
        }
        for read in self.t.readmap.get_prefix_reads(range, 1) {
            let Some(mate) = self.t.readmap.get_mate(read.read_id) else { continue };
            let mate_range = Range::new(mate.seqset_id, mate.seqset_id + 1, mate.len);
            *self.m_mates.entry(mate_range).or_insert(0) += 1;
            let expires_at = offset + self.t.options.max_pair_distance;
            self.mate_expiry.entry(expires_at).or_default().insert(mate_range);
        }
    }

    fn enqueue(&mut self, node: ActiveNode) {
        let key = node.cur_offset;
        self.queue.entry(key).or_default().push(node);
    }

    /// Searches `m_mates` for an entry sharing at least `min_overlap`
    /// bases with this node's current seqset context -- the
    /// `push_to_pair_discover` anchor search.
    fn find_pair_anchor(&self, node: &ActiveNode) -> Option<Range> {
        if node.seq.is_empty() {
            return None;
        }
        let range = self.t.seqset.find(node.seq.as_slice());
        if !range.is_valid() {
            return None;
        }
        self.m_mates
            .keys()
            .find(|mate| self.t.seqset.shared_prefix_length(range, **mate) >= self.t.options.min_overlap)
            .copied()
    }

    fn extend_or_drop(&mut self, mut node: ActiveNode, output: &mut dyn Stage) {
        let too_long = node.seq.len() >= self.t.options.max_indel_len && !node.is_insertion;
        let out_of_range = node.cur_offset - node.branch_offset >= self.t.options.scaffold_split_size;
        if too_long || out_of_range {
            self.emit_unresolved(node, output);
            return;
        }
        let Some(ref_base) = self.t.reference.base_at(self.t.reference.flatten(self.t.scaffold_id, node.cur_offset)) else {
            self.emit_unresolved(node, output);
            return;
        };
        node.seq.push(ref_base);
        node.cur_offset += 1;
        self.enqueue(node);
    }

    fn emit_pair_discovered(&self, node: &ActiveNode, _matched: Range, output: &mut dyn Stage) {
        let left = self.t.reference.flatten(self.t.scaffold_id, node.branch_offset) as i64;
        let right = self.t.reference.flatten(self.t.scaffold_id, node.cur_offset) as i64;
        let mut a = Assembly::new(OptionalOffset::some(left), OptionalOffset::some(right), node.seq.clone());
        a.min_overlap = self.t.options.min_overlap as u32;
        a.add_tag("bidirectional_tracer");
        a.add_tag("pair_discovered");
        a.add_tag(node.tag);
        output.add(a);
    }

    fn emit_unresolved(&self, node: ActiveNode, output: &mut dyn Stage) {
        if node.seq.is_empty() {
            return;
        }
        let left = self.t.reference.flatten(self.t.scaffold_id, node.branch_offset) as i64;
        let right = self.t.reference.flatten(self.t.scaffold_id, node.cur_offset) as i64;
        let mut a = Assembly::new(OptionalOffset::some(left), OptionalOffset::some(right), node.seq.clone());
        a.add_tag("bidirectional_tracer");
        a.add_tag(node.tag);
        a.add_tag("bidirectional_unresolved");

        let ends = self.t.seqset.find(a.seq.as_slice());
        if ends.is_valid() {
            let mut ends_set = BTreeSet::new();
            ends_set.insert(ends);
            let mut path = SeqsetPath::new();
            path.propagate_from_end(&ends_set, a.seq.as_slice(), self.t.seqset, self.t.readmap);
            a.seqset_entries = path;
        }
        output.add(a);
    }

    /// `branch_discover`: at `pos`, spawn new active-assembly nodes for
    /// every locally-supported alternative to the reference continuation
    /// -- a substitution, or a short deletion/insertion -- that the
    /// plain reference walk itself has no read support for.
    fn branch_discover(&mut self, pos: usize) {
        let Some(ref_base) = self.t.reference.base_at(self.t.reference.flatten(self.t.scaffold_id, pos)) else { return };
        let Some(tail) = self.ref_window(pos + 1, self.window - 1) else { return };

        let ref_support = self.window_support(ref_base, &tail);
        if ref_support > 0 {
            return; // reference continuation already supported; no local rejoin opportunity
        }

        for alt in Base::ALL {
            if alt == ref_base {
                continue;
            }
            if self.window_support(alt, &tail) >= self.t.options.min_overlap {
                let mut seq = Seq::new();
                seq.push(alt);
                self.spawn(pos, pos + 1, seq, "bidirectional_branch", false);
            }
        }

        for del_len in 1..=self.t.options.max_indel_len {
            let Some(after_gap) = self.ref_window(pos + 1 + del_len, self.window) else { break };
            if after_gap.is_empty() {
                continue;
            }
            if self.window_support(after_gap.get(0), &after_gap.subseq(1..after_gap.len())) >= self.t.options.min_overlap {
                self.spawn(pos + 1, pos + 1 + del_len, Seq::new(), "bidirectional_deletion", false);
                break;
            }
        }

        self.try_insertion(pos);
    }

    /// Greedily grows an inserted sequence at `pos` base by base, each
    /// step requiring seqset support for `inserted + tail(window-1 ref
    /// bases)`, stopping at the first length that is supported (a short
    /// local push search, bounded by `max_indel_len`).
    fn try_insertion(&mut self, pos: usize) {
        let Some(tail) = self.ref_window(pos + 1, self.window.saturating_sub(1)) else { return };
        let mut inserted = Seq::new();
        for _ in 0..self.t.options.max_indel_len {
            let mut best: Option<Base> = None;
            let mut best_support = 0usize;
            for alt in Base::ALL {
                let mut candidate = inserted.clone();
                candidate.push(alt);
                for i in 0..tail.len() {
                    candidate.push(tail.get(i));
                }
                let range = self.t.seqset.find(candidate.as_slice());
                if !range.is_valid() {
                    continue;
                }
                let support = self.t.readmap.get_prefix_reads(range, self.t.options.min_overlap).count();
                if support > best_support {
                    best_support = support;
                    best = Some(alt);
                }
            }
            let Some(alt) = best else { break };
            inserted.push(alt);
            if best_support >= self.t.options.min_overlap && inserted.len() >= 1 {
                self.spawn(pos + 1, pos + 1, inserted.clone(), "bidirectional_insertion", true);
                return;
            }
        }
    }

    fn spawn(&mut self, branch_offset: usize, cur_offset: usize, seq: Seq, tag: &'static str, is_insertion: bool) {
        let node = ActiveNode {
            branch_offset,
            cur_offset,
            seq,
            tag,
            is_insertion,
            mates_registered: false,
        };
        self.enqueue(node);
    }

    /// `window_support`: the number of reads supporting `head` followed
    /// by `tail` as a contiguous seqset context.
    fn window_support(&self, head: Base, tail: &Seq) -> usize {
        let mut seq = Seq::new();
        seq.push(head);
        for i in 0..tail.len() {
            seq.push(tail.get(i));
        }
        let range = self.t.seqset.find(seq.as_slice());
        if !range.is_valid() {
            return 0;
        }
        self.t.readmap.get_prefix_reads(range, self.t.options.min_overlap).count()
    }

    /// `len` consecutive reference bases starting at `start`, or `None`
    /// if any fall off the scaffold or land on an ambiguous base.
    fn ref_window(&self, start: usize, len: usize) -> Option<Seq> {
        let mut bases = Vec::with_capacity(len);
        for i in 0..len {
            bases.push(self.t.reference.base_at(self.t.reference.flatten(self.t.scaffold_id, start + i))?);
        }
        Some(Seq::from_bases(bases))
    }
}
