//! Reference genome and scaffold access (spec.md §3.2).
//!
//! The core only *consumes* a prebuilt reference: import from FASTA and BWT
//! construction are external-collaborator concerns (spec.md §1 Non-goals).
//! `bwt_range::find` here is a minimal in-memory suffix-table lookup that
//! satisfies the consumption-only contract without implementing a real BWT
//! (`original_source/modules/bio_base/reference.h`).

pub mod scaffold;

use crate::dna::{Base, Seq, Slice};

/// A maximal contiguous N-free run of bases within a scaffold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extent {
    /// Offset of this extent within its scaffold.
    pub offset: usize,
    pub seq: Seq,
}

impl Extent {
    pub fn end(&self) -> usize {
        self.offset + self.seq.len()
    }
}

/// A chromosome or contig: a name, a length, and its N-free extents.
#[derive(Debug, Clone)]
pub struct ScaffoldInfo {
    pub name: String,
    pub len: usize,
    pub extents: Vec<Extent>,
}

impl ScaffoldInfo {
    /// Builds a scaffold from a string that may contain runs of `N`,
    /// splitting it into maximal N-free extents.
    pub fn from_str_with_n(name: impl Into<String>, text: &str) -> ScaffoldInfo {
        let mut extents = Vec::new();
        let mut cur: Vec<Base> = Vec::new();
        let mut cur_offset = 0usize;
        let mut offset = 0usize;
        for c in text.chars() {
            match Base::from_char(c) {
                Some(b) => {
                    if cur.is_empty() {
                        cur_offset = offset;
                    }
                    cur.push(b);
                }
                None => {
                    if !cur.is_empty() {
                        extents.push(Extent { offset: cur_offset, seq: Seq::from_bases(std::mem::take(&mut cur)) });
                    }
                }
            }
            offset += 1;
        }
        if !cur.is_empty() {
            extents.push(Extent { offset: cur_offset, seq: Seq::from_bases(cur) });
        }
        ScaffoldInfo { name: name.into(), len: offset, extents }
    }
}

/// A position addressed as `(scaffold_id, position)`, mirroring
/// `original_source/modules/bio_base/seq_position.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqPosition {
    pub scaffold_id: usize,
    pub position: usize,
}

/// The whole reference genome: an ordered list of scaffolds plus the flat
/// address space mapping used throughout the pipeline (assembly offsets
/// are always flat positions).
#[derive(Debug, Clone, Default)]
pub struct Reference {
    pub scaffolds: Vec<ScaffoldInfo>,
    /// Flat offset at which each scaffold begins.
    flat_offsets: Vec<usize>,
}

impl Reference {
    pub fn new(scaffolds: Vec<ScaffoldInfo>) -> Reference {
        let mut flat_offsets = Vec::with_capacity(scaffolds.len());
        let mut acc = 0usize;
        for s in &scaffolds {
            flat_offsets.push(acc);
            acc += s.len;
        }
        Reference { scaffolds, flat_offsets }
    }

    pub fn total_len(&self) -> usize {
        self.flat_offsets.last().copied().unwrap_or(0)
            + self.scaffolds.last().map(|s| s.len).unwrap_or(0)
    }

    pub fn scaffold_id_by_name(&self, name: &str) -> Option<usize> {
        self.scaffolds.iter().position(|s| s.name == name)
    }

    /// Maps a `(scaffold, pos)` coordinate into the single monotone flat
    /// address space.
    pub fn flatten(&self, scaffold_id: usize, pos: usize) -> usize {
        self.flat_offsets[scaffold_id] + pos
    }

    /// Inverse of [`Reference::flatten`].
    pub fn get_seq_position(&self, flat_pos: usize) -> SeqPosition {
        // `flat_offsets` is sorted ascending; find the last scaffold whose
        // start is <= flat_pos.
        let scaffold_id = match self.flat_offsets.binary_search(&flat_pos) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        SeqPosition { scaffold_id, position: flat_pos - self.flat_offsets[scaffold_id] }
    }

    /// Returns the base at a flat position, or `None` if it falls in a gap
    /// (rendered as 'N').
    pub fn base_at(&self, flat_pos: usize) -> Option<Base> {
        let pos = self.get_seq_position(flat_pos);
        let scaffold = &self.scaffolds[pos.scaffold_id];
        for extent in &scaffold.extents {
            if pos.position >= extent.offset && pos.position < extent.end() {
                return Some(extent.seq.get(pos.position - extent.offset));
            }
        }
        None
    }

    /// Consumption-only BWT-style lookup: returns up to `limit` flat
    /// positions where `seq` occurs in the reference. Implemented as a
    /// brute-force scan over extents since BWT construction is out of
    /// scope (spec.md §1 Non-goals); production builds would swap this
    /// for a prebuilt FM-index without changing the call contract.
    pub fn find(&self, seq: Slice<'_>, limit: usize) -> BwtRange {
        let mut hits = Vec::new();
        if seq.is_empty() {
            return BwtRange { hits };
        }
        for (scaffold_id, scaffold) in self.scaffolds.iter().enumerate() {
            for extent in &scaffold.extents {
                if extent.seq.len() < seq.len() {
                    continue;
                }
                for start in 0..=(extent.seq.len() - seq.len()) {
                    if extent.seq.as_slice().subslice(start..start + seq.len()) == seq {
                        hits.push(self.flatten(scaffold_id, extent.offset + start));
                        if hits.len() >= limit {
                            return BwtRange { hits };
                        }
                    }
                }
            }
        }
        BwtRange { hits }
    }
}

/// Result of a [`Reference::find`] lookup: up to `N` concrete reference
/// positions, per spec.md §3.2.
#[derive(Debug, Clone, Default)]
pub struct BwtRange {
    hits: Vec<usize>,
}

impl BwtRange {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn positions(&self) -> &[usize] {
        &self.hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extents_split_on_n() {
        let s = ScaffoldInfo::from_str_with_n("chr1", "ACGTNNNNNACGT");
        assert_eq!(s.len, 13);
        assert_eq!(s.extents.len(), 2);
        assert_eq!(s.extents[0].offset, 0);
        assert_eq!(s.extents[1].offset, 9);
    }

    #[test]
    fn flatten_round_trip() {
        let r = Reference::new(vec![
            ScaffoldInfo::from_str_with_n("chr1", "ACGTACGT"),
            ScaffoldInfo::from_str_with_n("chr2", "TTTTGGGG"),
        ]);
        let flat = r.flatten(1, 3);
        assert_eq!(flat, 11);
        let pos = r.get_seq_position(flat);
        assert_eq!(pos.scaffold_id, 1);
        assert_eq!(pos.position, 3);
    }

    #[test]
    fn find_locates_substring() {
        let r = Reference::new(vec![ScaffoldInfo::from_str_with_n("chr1", "ACGTACGTACGT")]);
        let needle = Seq::from("ACGT");
        let hits = r.find(needle.as_slice(), 10);
        assert_eq!(hits.positions(), &[0, 4, 8]);
    }
}
