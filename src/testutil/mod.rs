//! Synthetic test fixtures shared by unit and end-to-end tests.
//!
//! Grounded in `original_source/modules/bio_base/dna_testutil.h`'s `tseq`:
//! a deterministic per-letter motif generator so that concatenating labels
//! (`tseq("abc") + tseq("def") == tseq("abcdef")`) gives tests a stable,
//! human-readable way to talk about reference positions (spec.md §8's
//! end-to-end scenarios call `tseq` directly).

use crate::dna::Seq;
use crate::readmap::{Read, ReadId, Readmap};
use crate::reference::{Reference, ScaffoldInfo};
use crate::seqset::{Seqset, SeqsetId};

/// One 4-base motif per lowercase letter, chosen so no motif is its own
/// reverse complement and no two motifs collide.
const MOTIFS: [&str; 26] = [
    "ACGA", "ACGC", "ACGG", "ACTA", "ACTC", "ACTG", "AGCA", "AGCC", "AGCT", "AGTC", "AGTG", "AGTT",
    "ATCA", "ATCC", "ATCG", "ATGC", "ATGG", "ATGT", "CAGA", "CAGC", "CAGG", "CATC", "CATG", "CATT",
    "CCAG", "CCAT",
];

fn motif(c: char) -> &'static str {
    let idx = (c as u8)
        .checked_sub(b'a')
        .filter(|&i| (i as usize) < MOTIFS.len())
        .unwrap_or_else(|| panic!("tseq: label chars must be 'a'..='z', got {c:?}"));
    MOTIFS[idx as usize]
}

/// Deterministic synthetic sequence for a label of lowercase letters.
/// `tseq("abc")` is always a prefix of `tseq("abcdef")`, letting tests
/// reason about positions compositionally.
pub fn tseq(label: &str) -> Seq {
    let mut out = String::new();
    for c in label.chars() {
        out.push_str(motif(c));
    }
    Seq::from(out.as_str())
}

/// Builds a scaffold named `name` from a `tseq` label, with no gaps.
pub fn tseq_scaffold(name: &str, label: &str) -> ScaffoldInfo {
    ScaffoldInfo::from_str_with_n(name, &tseq(label).to_string())
}

/// Builds a single-scaffold reference from a `tseq` label.
pub fn tseq_reference(label: &str) -> Reference {
    Reference::new(vec![tseq_scaffold("chr1", label)])
}

/// Builds a seqset containing every suffix of every given read and of its
/// reverse complement, matching the sort-order contract documented in
/// [`crate::seqset`].
pub fn build_seqset(reads: &[Seq]) -> Seqset {
    let mut contexts = Vec::new();
    for read in reads {
        for i in 0..=read.len() {
            contexts.push(read.suffix(read.len() - i).to_owned_seq());
        }
        let rc = read.rev_comp();
        for i in 0..=rc.len() {
            contexts.push(rc.suffix(rc.len() - i).to_owned_seq());
        }
    }
    Seqset::from_contexts(contexts)
}

/// Builds a readmap from read-pair sequences, laying out ids as
/// interleaved `{r, rc(r), m, rc(m)}` quadruplets per pair so that
/// [`Readmap::get_rev_comp`]'s `read_id ^ 1` trick holds, matching the
/// assumption documented on that method.
pub fn build_readmap(pairs: &[(Seq, Seq)], seqset: &Seqset) -> Readmap {
    let mut reads = Vec::new();
    let mut next_id: ReadId = 0;
    for (r1, r2) in pairs {
        let r1_id = next_id;
        let rc1_id = next_id + 1;
        let r2_id = next_id + 2;
        let rc2_id = next_id + 3;
        next_id += 4;

        push_quad(&mut reads, r1_id, rc1_id, r2_id, r1, seqset);
        push_quad(&mut reads, r2_id, rc2_id, r1_id, r2, seqset);
    }
    Readmap::new(reads, true)
}

fn push_quad(reads: &mut Vec<Read>, id: ReadId, rc_id: ReadId, mate_id: ReadId, seq: &Seq, seqset: &Seqset) {
    let fwd_seqset_id: SeqsetId = seqset.find_existing(seq.as_slice());
    let rc_seqset_id: SeqsetId = seqset.find_existing(seq.rev_comp().as_slice());
    reads.push(Read {
        read_id: id,
        seqset_id: fwd_seqset_id,
        len: seq.len(),
        is_forward: true,
        mate_read_id: Some(mate_id),
    });
    reads.push(Read {
        read_id: rc_id,
        seqset_id: rc_seqset_id,
        len: seq.len(),
        is_forward: false,
        mate_read_id: None,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tseq_is_compositional() {
        let whole = tseq("abcdef");
        let prefix = tseq("abc");
        assert_eq!(whole.prefix(prefix.len()).to_owned_seq(), prefix);
    }

    #[test]
    fn tseq_rejects_non_lowercase() {
        let result = std::panic::catch_unwind(|| tseq("ABC"));
        assert!(result.is_err());
    }

    #[test]
    fn build_seqset_finds_every_read() {
        let reads = vec![tseq("abc"), tseq("def")];
        let seqset = build_seqset(&reads);
        for read in &reads {
            assert!(seqset.find(read.as_slice()).is_valid());
        }
    }

    #[test]
    fn build_readmap_mates_pair_up() {
        let r1 = tseq("abc");
        let r2 = tseq("def");
        let seqset = build_seqset(&[r1.clone(), r2.clone()]);
        let readmap = build_readmap(&[(r1, r2)], &seqset);
        assert_eq!(readmap.len(), 4);
        let mate = readmap.get_mate(0).unwrap();
        assert_eq!(mate.read_id, 2);
    }
}
