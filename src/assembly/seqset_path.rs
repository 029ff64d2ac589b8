//! Per-assembly seqset-range bookkeeping (spec.md §3.7).
//!
//! Grounded in `original_source/modules/variants/assemble.h`'s
//! `seqset_path`: a sparse map from offset to the set of seqset ranges
//! that match the path's suffix at that offset, plus a derived set of
//! mate ranges. Used by the tracers and by phase-join to carry
//! read/pair support through graph merges without re-walking the seqset
//! from scratch every time.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::assembly::AOffset;
use crate::dna::Slice;
use crate::readmap::Readmap;
use crate::seqset::{Range, Seqset};

/// A sorted, deduplicated set of seqset ranges, ordered by `(begin, end,
/// length)` so iteration is deterministic.
pub type RangeSet = BTreeSet<Range>;

/// `seqset_entries[offset]` is the set of ranges that match the path's
/// suffix of length `offset`, counting backward from the path's end
/// (empty entries mean "no data available", not "no such path").
#[derive(Debug, Clone, Default)]
pub struct SeqsetPath {
    entries: BTreeMap<AOffset, RangeSet>,
    mates: RangeSet,
}

impl SeqsetPath {
    pub fn new() -> SeqsetPath {
        SeqsetPath::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &BTreeMap<AOffset, RangeSet> {
        &self.entries
    }

    pub fn mates(&self) -> &RangeSet {
        &self.mates
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.mates.clear();
    }

    pub fn add(&mut self, offset: AOffset, r: Range) {
        self.entries.entry(offset).or_default().insert(r);
    }

    pub fn add_many(&mut self, offset: AOffset, rs: &RangeSet) {
        self.entries.entry(offset).or_default().extend(rs.iter().copied());
    }

    /// `seqset_entries[0]`, or an empty set if no data is available.
    pub fn starts(&self) -> RangeSet {
        self.entries.values().next().cloned().unwrap_or_default()
    }

    /// `seqset_entries[seq.size()]`, or an empty set if no data is available.
    pub fn ends(&self) -> RangeSet {
        self.entries.values().next_back().cloned().unwrap_or_default()
    }

    /// Rebuilds every interior offset from a fresh set of ends by
    /// repeatedly applying `push_front_drop` backward through `seq`, then
    /// drops any range that is a strict prefix-subrange of another range
    /// at the same offset (entries whose `push_front_drop` chain turned
    /// out to be redundant with a more specific one).
    pub fn propagate_from_end(
        &mut self,
        new_ends: &RangeSet,
        seq: Slice<'_>,
        seqset: &Seqset,
        readmap: &Readmap,
    ) {
        self.clear();
        let len = seq.len() as AOffset;
        self.add_many(len, new_ends);
        let mut current = new_ends.clone();
        for offset in (0..len).rev() {
            let b = seq.get(offset as usize).complement();
            let mut next = BTreeSet::new();
            for r in &current {
                let pushed = seqset.push_front_drop(*r, b);
                if pushed.is_valid() {
                    next.insert(pushed);
                }
            }
            dedup_prefixes(&mut next);
            self.add_many(offset, &next);
            current = next;
        }
        self.mates = collect_mates(&self.entries, readmap);
    }
}

/// Removes every range in `rs` that is a prefix-subrange of another range
/// in `rs` (same trailing content, shorter length and thus looser match),
/// since it carries no information the more specific range doesn't
/// already carry. Mirrors `seqset_set_dedup_prefixes`.
fn dedup_prefixes(rs: &mut RangeSet) {
    let all: Vec<Range> = rs.iter().copied().collect();
    rs.retain(|r| {
        !all.iter().any(|other| {
            other != r
                && other.length() > r.length()
                && other.begin() >= r.begin()
                && other.end() <= r.end()
        })
    });
}

fn collect_mates(entries: &BTreeMap<AOffset, RangeSet>, readmap: &Readmap) -> RangeSet {
    let mut mates = BTreeSet::new();
    for ranges in entries.values() {
        for r in ranges {
            for read in readmap.get_prefix_reads(*r, 1) {
                if readmap.get_mate(read.read_id).is_some() {
                    mates.insert(*r);
                }
            }
        }
    }
    mates
}
