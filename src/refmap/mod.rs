//! Ref-map: a packed byte per seqset entry recording whether, and how
//! ambiguously, that context is anchored in the reference (spec.md §3.5,
//! §4.3).
//!
//! Grounded directly in `original_source/modules/variants/ref_map.h`: the
//! bit layout (`k_fwd_flag`/`k_rev_flag`/`k_count_mask`), the chunked
//! parallel build (`k_min_chunk_size`), and the sharded-lock flush
//! (`k_num_flush_buckets`, `k_flush_bucket_size`) are all carried over;
//! only the underlying packed-bit-vector storage is replaced with a plain
//! byte vector for this in-memory build.

use std::sync::Mutex;

use rayon::prelude::*;

use crate::dna::Slice;
use crate::reference::{Reference, SeqPosition};
use crate::seqset::{Seqset, SeqsetId};

const FWD_FLAG: u8 = 1 << 7;
const REV_FLAG: u8 = 1 << 6;
const COUNT_MASK: u8 = (1 << 6) - 1;

/// Minimum chunk size of reference to hand to one rayon task.
const MIN_CHUNK_SIZE: usize = 25_600;
/// Number of buckets used to shard the flush-phase locking.
const NUM_FLUSH_BUCKETS: usize = 32;

/// One ref-map byte, decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry(u8);

impl Entry {
    pub fn is_match(&self) -> bool {
        self.fwd_match() || self.rev_match()
    }

    pub fn fwd_match(&self) -> bool {
        self.0 & FWD_FLAG != 0
    }

    pub fn rev_match(&self) -> bool {
        self.0 & REV_FLAG != 0
    }

    pub fn match_count(&self) -> u32 {
        (self.0 & COUNT_MASK) as u32
    }

    pub fn is_unique(&self) -> bool {
        self.match_count() == 1
    }
}

/// A concrete reference placement for a uniquely-anchored seqset entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefAnchor {
    pub pos: SeqPosition,
    pub rev_comp: bool,
}

/// Per-entry accumulator used while building, before the final byte
/// packing. Saturates at `COUNT_MASK` just like the packed form.
#[derive(Debug, Clone, Copy, Default)]
struct Counts {
    fwd: bool,
    rev: bool,
    count: u8,
}

impl Counts {
    fn bump(&mut self, is_rev: bool) {
        if is_rev {
            self.rev = true;
        } else {
            self.fwd = true;
        }
        self.count = self.count.saturating_add(1).min(COUNT_MASK);
    }

    fn merge(&mut self, other: Counts) {
        self.fwd |= other.fwd;
        self.rev |= other.rev;
        self.count = self.count.saturating_add(other.count).min(COUNT_MASK);
    }

    fn pack(self) -> u8 {
        if self.count == 0 {
            return 0;
        }
        let mut v = self.count & COUNT_MASK;
        if self.fwd {
            v |= FWD_FLAG;
        }
        if self.rev {
            v |= REV_FLAG;
        }
        v
    }
}

#[derive(Debug, Clone)]
pub struct RefMap {
    bytes: Vec<u8>,
}

impl RefMap {
    /// Scans the whole reference in parallel chunks of at least
    /// [`MIN_CHUNK_SIZE`] bases, walking the seqset forward from every
    /// position to find exact-length matches, and sharding the
    /// accumulation across [`NUM_FLUSH_BUCKETS`] locked buckets before
    /// packing the final per-entry byte.
    pub fn build(seqset: &Seqset, reference: &Reference) -> RefMap {
        let size = seqset.size() as usize;
        let max_len = seqset.max_read_len().max(1);
        let buckets: Vec<Mutex<Vec<(SeqsetId, Counts)>>> =
            (0..NUM_FLUSH_BUCKETS).map(|_| Mutex::new(Vec::new())).collect();
        let bucket_span = ((size + NUM_FLUSH_BUCKETS - 1) / NUM_FLUSH_BUCKETS).max(1);

        let chunks = chunk_reference(reference, MIN_CHUNK_SIZE);
        chunks.par_iter().for_each(|&(scaffold_id, start, end)| {
            let mut local: Vec<(SeqsetId, Counts)> = Vec::new();
            scan_chunk(seqset, reference, scaffold_id, start, end, max_len, &mut local);
            flush_local(&buckets, bucket_span, local);
        });

        let mut bytes = vec![0u8; size];
        for bucket in &buckets {
            for (id, counts) in bucket.lock().unwrap().drain(..) {
                let existing = Counts {
                    fwd: bytes[id as usize] & FWD_FLAG != 0,
                    rev: bytes[id as usize] & REV_FLAG != 0,
                    count: bytes[id as usize] & COUNT_MASK,
                };
                let mut merged = existing;
                merged.merge(counts);
                bytes[id as usize] = merged.pack();
            }
        }
        RefMap { bytes }
    }

    pub fn get(&self, seqset_id: SeqsetId) -> Entry {
        Entry(self.bytes[seqset_id as usize])
    }

    pub fn get_unique_ref_anchor(&self, seqset_id: SeqsetId, reference: &Reference, seqset: &Seqset) -> Option<RefAnchor> {
        let entry = self.get(seqset_id);
        if !entry.is_unique() {
            return None;
        }
        let rev = entry.rev_match();
        let ctx = seqset.ctx_entry(seqset_id);
        let target: crate::dna::Seq = if rev { ctx.sequence().rev_comp() } else { ctx.sequence().to_owned_seq() };
        let hits = reference.find(target.as_slice(), 1);
        hits.positions().first().map(|&flat| RefAnchor { pos: reference.get_seq_position(flat), rev_comp: rev })
    }
}

fn chunk_reference(reference: &Reference, min_chunk: usize) -> Vec<(usize, usize, usize)> {
    let mut chunks = Vec::new();
    for (scaffold_id, scaffold) in reference.scaffolds.iter().enumerate() {
        let mut start = 0usize;
        while start < scaffold.len {
            let end = (start + min_chunk).min(scaffold.len);
            chunks.push((scaffold_id, start, end));
            start = end;
        }
    }
    chunks
}

#[allow(clippy::too_many_arguments)]
fn scan_chunk(
    seqset: &Seqset,
    reference: &Reference,
    scaffold_id: usize,
    start: usize,
    end: usize,
    max_len: usize,
    local: &mut Vec<(SeqsetId, Counts)>,
) {
    let scaffold_len = reference.scaffolds[scaffold_id].len;
    for pos in start..end {
        let window_cap = max_len.min(scaffold_len - pos);
        let mut bases = Vec::with_capacity(window_cap);
        for offset in 0..window_cap {
            match reference.base_at(reference.flatten(scaffold_id, pos + offset)) {
                Some(b) => bases.push(b),
                None => break,
            }
        }
        for len in 1..=bases.len() {
            let window = Slice::new(&bases[..len]);
            let fwd_range = seqset.find(window);
            if fwd_range.is_valid() {
                for id in fwd_range.begin()..fwd_range.end() {
                    if seqset.entry_size(id) == len {
                        local.push((id, counts_for(false)));
                    }
                }
            }
            let rc = window.rev_comp();
            let rev_range = seqset.find(rc.as_slice());
            if rev_range.is_valid() {
                for id in rev_range.begin()..rev_range.end() {
                    if seqset.entry_size(id) == len {
                        local.push((id, counts_for(true)));
                    }
                }
            }
        }
    }
}

fn counts_for(is_rev: bool) -> Counts {
    let mut c = Counts::default();
    c.bump(is_rev);
    c
}

fn flush_local(buckets: &[Mutex<Vec<(SeqsetId, Counts)>>], bucket_span: usize, local: Vec<(SeqsetId, Counts)>) {
    for (id, counts) in local {
        let bucket = (id as usize / bucket_span) % buckets.len();
        buckets[bucket].lock().unwrap().push((id, counts));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dna::Seq;
    use crate::reference::ScaffoldInfo;
    use pretty_assertions::assert_eq;

    // "ACGG" is not its own reverse complement, so its two forward
    // placements below stay cleanly separated from any reverse hits.
    fn sample() -> (Seqset, Reference) {
        let reference = Reference::new(vec![ScaffoldInfo::from_str_with_n("chr1", "ACGGACGG")]);
        let read = Seq::from("ACGG");
        let mut contexts = Vec::new();
        for i in 0..=read.len() {
            contexts.push(read.suffix(read.len() - i));
        }
        let rc = read.rev_comp();
        for i in 0..=rc.len() {
            contexts.push(rc.suffix(rc.len() - i));
        }
        (Seqset::from_contexts(contexts), reference)
    }

    #[test]
    fn count_zero_iff_no_match_flags() {
        let (seqset, reference) = sample();
        let rm = RefMap::build(&seqset, &reference);
        for id in 0..seqset.size() {
            let e = rm.get(id);
            assert_eq!(e.match_count() == 0, !e.is_match());
        }
    }

    #[test]
    fn full_read_has_multiple_fwd_matches() {
        let (seqset, reference) = sample();
        let rm = RefMap::build(&seqset, &reference);
        let id = seqset.find_existing(Seq::from("ACGG").as_slice());
        let e = rm.get(id);
        assert!(e.fwd_match());
        assert!(!e.rev_match());
        assert_eq!(e.match_count(), 2);
    }

    #[test]
    fn unique_anchor_roundtrips_position() {
        let reference = Reference::new(vec![ScaffoldInfo::from_str_with_n("chr1", "ACGGTTTTTTTTT")]);
        let read = Seq::from("ACGG");
        let mut contexts = Vec::new();
        for i in 0..=read.len() {
            contexts.push(read.suffix(read.len() - i));
        }
        let rc = read.rev_comp();
        for i in 0..=rc.len() {
            contexts.push(rc.suffix(rc.len() - i));
        }
        let seqset = Seqset::from_contexts(contexts);
        let rm = RefMap::build(&seqset, &reference);
        let id = seqset.find_existing(Seq::from("ACGG").as_slice());
        let e = rm.get(id);
        assert!(e.is_unique());
        let anchor = rm.get_unique_ref_anchor(id, &reference, &seqset).unwrap();
        assert_eq!(anchor.pos.position, 0);
        assert!(!anchor.rev_comp);
    }
}
