//! Aligner, anchor-dropper, and align-splitter (spec.md §4.6).
//!
//! Grounded in the original aligner's kmer-table longest-common-substring
//! approach: a small kmer index (`kmer size <= 31`) locates the best
//! matching run between an assembly's sequence and the corresponding
//! reference span, and the remaining difference is partitioned into
//! [`crate::assembly::AlignedVar`]s.

use std::collections::HashMap;

use crate::assembly::{AlignedVar, Assembly, OptionalOffset};
use crate::dna::{Base, Seq, Slice};
use crate::pipeline::{ExpectedOrder, Stage};
use crate::reference::Reference;

/// Which edge of the match the aligner should bias toward when multiple
/// equally-long common substrings exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorType {
    Left,
    Right,
    Both,
}

#[derive(Debug, Clone)]
pub struct AlignerOptions {
    pub kmer_size: usize,
    pub anchor_type: AnchorType,
    pub max_ref_align_bases: usize,
}

impl Default for AlignerOptions {
    fn default() -> Self {
        AlignerOptions { kmer_size: 16, anchor_type: AnchorType::Both, max_ref_align_bases: 4 }
    }
}

/// Builds a kmer -> positions index over `seq`.
fn kmer_index(seq: Slice<'_>, k: usize) -> HashMap<Vec<Base>, Vec<usize>> {
    let mut index: HashMap<Vec<Base>, Vec<usize>> = HashMap::new();
    if seq.len() < k || k == 0 {
        return index;
    }
    for start in 0..=(seq.len() - k) {
        let key: Vec<Base> = (0..k).map(|i| seq.get(start + i)).collect();
        index.entry(key).or_default().push(start);
    }
    index
}

/// Finds the longest common substring between `a` and `b`, returning
/// `(a_start, b_start, len)`, using a kmer seed-and-extend strategy.
fn longest_common_substring(a: Slice<'_>, b: Slice<'_>, k: usize) -> Option<(usize, usize, usize)> {
    let k = k.min(a.len()).min(b.len()).max(1);
    let index = kmer_index(b, k);
    let mut best: Option<(usize, usize, usize)> = None;
    if a.len() < k {
        return None;
    }
    for a_start in 0..=(a.len() - k) {
        let key: Vec<Base> = (0..k).map(|i| a.get(a_start + i)).collect();
        let Some(b_starts) = index.get(&key) else { continue };
        for &b_start in b_starts {
            let mut len = k;
            while a_start + len < a.len()
                && b_start + len < b.len()
                && a.get(a_start + len) == b.get(b_start + len)
            {
                len += 1;
            }
            let mut shift = 0;
            while shift < a_start.min(b_start) && a.get(a_start - shift - 1) == b.get(b_start - shift - 1) {
                shift += 1;
            }
            let (full_a, full_b, full_len) = (a_start - shift, b_start - shift, len + shift);
            if best.map(|(_, _, best_len)| full_len > best_len).unwrap_or(true) {
                best = Some((full_a, full_b, full_len));
            }
        }
    }
    best
}

/// Aligns a single fully-anchored assembly against its reference span,
/// attaching partitioned [`AlignedVar`]s.
pub fn align_assembly(a: &mut Assembly, reference: &Reference, scaffold_id: usize, options: &AlignerOptions) {
    let (Some(left), Some(right)) = (a.left_offset.is_present().then(|| a.left_offset.get()), a.right_offset.is_present().then(|| a.right_offset.get())) else {
        return;
    };
    let span = (right - left) as usize;
    let mut ref_bases = Vec::with_capacity(span);
    for i in 0..span {
        match reference.base_at(left as usize + i) {
            Some(b) => ref_bases.push(b),
            None => return,
        }
    }
    let ref_seq = Seq::from_bases(ref_bases);
    let _ = scaffold_id;

    if a.seq == ref_seq {
        a.matches_reference = true;
        a.aligned_variants.clear();
        return;
    }

    match longest_common_substring(a.seq.as_slice(), ref_seq.as_slice(), options.kmer_size) {
        Some((a_start, r_start, len)) if len >= options.max_ref_align_bases => {
            let mut vars = Vec::new();
            if a_start > 0 || r_start > 0 {
                vars.push(AlignedVar {
                    left_offset: left,
                    right_offset: left + r_start as i64,
                    seq: a.seq.subseq(0..a_start),
                    max_alt_depth: 0,
                });
            }
            let after_a = a_start + len;
            let after_r = r_start + len;
            if after_a < a.seq.len() || after_r < ref_seq.len() {
                vars.push(AlignedVar {
                    left_offset: left + after_r as i64,
                    right_offset: right,
                    seq: a.seq.subseq(after_a..a.seq.len()),
                    max_alt_depth: 0,
                });
            }
            a.aligned_variants = vars.into_iter().filter(|v| !v.is_empty()).collect();
        }
        _ => {
            // No good common substring: the whole span is one variant.
            a.aligned_variants = vec![AlignedVar { left_offset: left, right_offset: right, seq: a.seq.clone(), max_alt_depth: 0 }];
        }
    }
}

/// Attempts a long-range rejoin for a half-anchored assembly by indexing
/// kmers from the read-ahead reference window and scanning the
/// assembly's sequence past its known anchor for a hit sharing at least
/// `min_overlap` bases.
pub fn anchor_drop(a: &Assembly, reference: &Reference, read_ahead: Slice<'_>, read_ahead_start: i64, min_overlap: usize, kmer_size: usize) -> Option<i64> {
    let _ = reference;
    if a.left_offset.is_present() == a.right_offset.is_present() {
        return None; // already both-anchored or neither: not half-anchored
    }
    let k = kmer_size.min(read_ahead.len()).max(1);
    let index = kmer_index(read_ahead, k);
    if a.seq.len() < k {
        return None;
    }
    let mut best: Option<(usize, usize)> = None;
    for a_start in 0..=(a.seq.len() - k) {
        let key: Vec<Base> = (0..k).map(|i| a.seq.get(a_start + i)).collect();
        let Some(hits) = index.get(&key) else { continue };
        for &hit in hits {
            let mut len = k;
            while a_start + len < a.seq.len()
                && hit + len < read_ahead.len()
                && a.seq.get(a_start + len) == read_ahead.get(hit + len)
            {
                len += 1;
            }
            if len >= min_overlap && best.map(|(_, best_len)| len > best_len).unwrap_or(true) {
                best = Some((hit, len));
            }
        }
    }
    best.map(|(hit, _)| read_ahead_start + hit as i64)
}

/// Splits an aligned assembly into individual variant records plus the
/// reference gaps between them, as short-record dumps (debug CSV and
/// eventual VCF rows consume this directly).
pub fn align_splitter(a: &Assembly) -> Vec<AlignedVar> {
    a.aligned_variants.iter().filter(|v| !v.is_empty()).cloned().collect()
}

/// `Stage` wrapper around [`align_assembly`]: calls it on every assembly
/// before forwarding downstream.
pub struct AlignerStage<'a, S: Stage> {
    downstream: S,
    reference: &'a Reference,
    scaffold_id: usize,
    options: AlignerOptions,
}

impl<'a, S: Stage> AlignerStage<'a, S> {
    pub fn new(downstream: S, reference: &'a Reference, scaffold_id: usize, options: AlignerOptions) -> Self {
        AlignerStage { downstream, reference, scaffold_id, options }
    }
}

impl<'a, S: Stage> Stage for AlignerStage<'a, S> {
    fn expected_order(&self) -> ExpectedOrder {
        self.downstream.expected_order()
    }

    fn add(&mut self, mut a: Assembly) {
        align_assembly(&mut a, self.reference, self.scaffold_id, &self.options);
        self.downstream.add(a);
    }

    fn flush(&mut self) {
        self.downstream.flush();
    }
}

/// `Stage` wrapper around [`align_splitter`]: replaces each aligned
/// assembly with one emitted assembly per non-empty `AlignedVar`, each
/// carrying the parent's identity forward via `merged_assembly_ids`
/// (spec.md §4 data flow: "breaks each aligned assembly into a sequence
/// of short variant records... and emits them individually").
pub struct AlignSplitterStage<S: Stage> {
    downstream: S,
}

impl<S: Stage> AlignSplitterStage<S> {
    pub fn new(downstream: S) -> Self {
        AlignSplitterStage { downstream }
    }
}

impl<S: Stage> Stage for AlignSplitterStage<S> {
    fn expected_order(&self) -> ExpectedOrder {
        self.downstream.expected_order()
    }

    fn add(&mut self, a: Assembly) {
        if a.matches_reference || a.aligned_variants.is_empty() {
            self.downstream.add(a);
            return;
        }
        for var in align_splitter(&a) {
            let mut child = Assembly::new(OptionalOffset::some(var.left_offset), OptionalOffset::some(var.right_offset), var.seq);
            child.merged_assembly_ids.push(a.assembly_id);
            child.tags = a.tags.clone();
            child.score = a.score;
            self.downstream.add(child);
        }
    }

    fn flush(&mut self) {
        self.downstream.flush();
    }
}
