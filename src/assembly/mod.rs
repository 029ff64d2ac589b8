//! The central pipeline record: an `Assembly` and everything attached to
//! it as it flows through the stages (spec.md §3.6, §3.7).
//!
//! Grounded in `original_source/modules/variants/assemble.h`: field names
//! and invariants are carried over directly (`aligned_var`,
//! `edge_coverage_t`, `assembly_ml_features`, `seqset_path`,
//! `canon_assembly_order`), translated from the original's boost/absl
//! vocabulary into owned Rust collections and a `thiserror` check routine
//! in place of `DCHECK`.

pub mod seqset_path;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use crate::dna::Seq;
use crate::readmap::ReadId;
pub use seqset_path::{RangeSet, SeqsetPath};

/// Assembly offset, a signed reference coordinate (negative and
/// past-end values are used transiently while tracing).
pub type AOffset = i64;

/// Assembly search cost, accumulated by the tracers.
pub type ACost = i64;

/// A reference coordinate that may be absent (half-aligned assemblies
/// anchor on only one side). Arithmetic on an absent offset panics --
/// this is a programmer error, never a user-facing one (spec.md §3.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct OptionalOffset(Option<AOffset>);

impl OptionalOffset {
    pub const NONE: OptionalOffset = OptionalOffset(None);

    pub fn some(v: AOffset) -> OptionalOffset {
        OptionalOffset(Some(v))
    }

    pub fn is_present(&self) -> bool {
        self.0.is_some()
    }

    pub fn get(&self) -> AOffset {
        self.0.expect("missing assembly offset")
    }

    pub fn map(&self, f: impl FnOnce(AOffset) -> AOffset) -> OptionalOffset {
        OptionalOffset(self.0.map(f))
    }
}

impl From<AOffset> for OptionalOffset {
    fn from(v: AOffset) -> Self {
        OptionalOffset(Some(v))
    }
}

impl std::ops::Add<AOffset> for OptionalOffset {
    type Output = AOffset;
    fn add(self, rhs: AOffset) -> AOffset {
        self.get() + rhs
    }
}

impl std::ops::Sub<AOffset> for OptionalOffset {
    type Output = AOffset;
    fn sub(self, rhs: AOffset) -> AOffset {
        self.get() - rhs
    }
}

/// A pure variant relative to reference, inside an assembly's span.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AlignedVar {
    pub left_offset: AOffset,
    pub right_offset: AOffset,
    pub seq: Seq,
    /// Result from genotyping, populated later in the pipeline.
    pub max_alt_depth: u32,
}

impl AlignedVar {
    pub fn is_empty(&self) -> bool {
        self.left_offset == self.right_offset && self.seq.is_empty()
    }
}

/// Sum of read lengths and aligned-base counts backing an assembly's
/// score (`align_count_t`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlignCount {
    pub local_read_lens: usize,
    pub local_aligned_bases: usize,
    pub tot_aligned_bases: usize,
}

/// Pair-support read ids at each of an assembly's edges, for phasing and
/// genotyping (`edge_coverage_t`).
#[derive(Debug, Clone, Default)]
pub struct EdgeCoverage {
    pub variant_start: BTreeSet<ReadId>,
    pub variant_end: BTreeSet<ReadId>,
    pub interior: BTreeSet<ReadId>,
    pub reference_start: BTreeSet<ReadId>,
    pub reference_end: BTreeSet<ReadId>,
    pub start_common: AOffset,
    pub end_common: AOffset,
}

/// Numeric feature bundle emitted alongside the VCF record
/// (`assembly_ml_features`).
#[derive(Debug, Clone, Default)]
pub struct MlFeatures {
    pub score: i32,
    pub refspan: i32,
    pub lanch: i32,
    pub ranch: i32,
    pub refgc: f32,
    pub altgc: f32,
    pub alt_seq: Seq,
}

/// Structured per-base or per-read coverage map, used for `read_coverage`
/// and `pair_read_coverage`.
#[derive(Debug, Clone, Default)]
pub struct ReadCoverage {
    pub by_offset: Vec<BTreeSet<ReadId>>,
}

static NEXT_ASSEMBLY_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a process-unique, monotonically increasing assembly id.
pub fn allocate_assembly_id() -> u64 {
    NEXT_ASSEMBLY_ID.fetch_add(1, AtomicOrdering::Relaxed)
}

/// The central pipeline record (spec.md §3.6).
#[derive(Debug, Clone)]
pub struct Assembly {
    pub assembly_id: u64,
    pub merged_assembly_ids: Vec<u64>,

    pub left_offset: OptionalOffset,
    pub left_anchor_len: u32,
    pub right_offset: OptionalOffset,
    pub right_anchor_len: u32,

    /// The bases between `[left_offset, right_offset + right_anchor_len)`.
    pub seq: Seq,

    pub trace_steps: u32,
    pub unique_pairs_used: u32,
    pub min_overlap: u32,
    pub left_anchor_ambiguous_bases: u32,

    pub other_depth: u32,
    pub other_pair_depth: u32,
    pub ref_depth: u32,
    pub strand_count: u32,
    pub genotype_quality: f64,

    pub rc_read_ids: BTreeSet<ReadId>,

    /// Interbase coverage; length `seq.len() + 1` when present.
    pub coverage: Vec<u32>,
    pub pair_coverage: Vec<u32>,

    pub left_pair_matches: Vec<ReadId>,
    pub right_pair_matches: Vec<ReadId>,

    pub score: ACost,
    pub matches_reference: bool,

    pub aligned_variants: Vec<AlignedVar>,
    pub bypass_coverage: bool,

    pub edge_coverage: Option<EdgeCoverage>,
    pub read_coverage: Option<ReadCoverage>,
    pub pair_read_coverage: Option<ReadCoverage>,
    pub align_count: Option<AlignCount>,
    pub read_cov_max_paths: usize,

    pub tags: BTreeSet<String>,
    pub phase_ids: BTreeSet<String>,

    pub sub_assemblies: Vec<u64>,

    pub seqset_entries: SeqsetPath,
    pub rc_seqset_entries: SeqsetPath,

    pub ml_features: Option<MlFeatures>,
}

impl Assembly {
    pub fn new(left_offset: OptionalOffset, right_offset: OptionalOffset, seq: Seq) -> Assembly {
        Assembly {
            assembly_id: allocate_assembly_id(),
            merged_assembly_ids: Vec::new(),
            left_offset,
            left_anchor_len: 0,
            right_offset,
            right_anchor_len: 0,
            seq,
            trace_steps: 0,
            unique_pairs_used: 0,
            min_overlap: 0,
            left_anchor_ambiguous_bases: 0,
            other_depth: 0,
            other_pair_depth: 0,
            ref_depth: 0,
            strand_count: 0,
            genotype_quality: 0.0,
            rc_read_ids: BTreeSet::new(),
            coverage: Vec::new(),
            pair_coverage: Vec::new(),
            left_pair_matches: Vec::new(),
            right_pair_matches: Vec::new(),
            score: 0,
            matches_reference: false,
            aligned_variants: Vec::new(),
            bypass_coverage: false,
            edge_coverage: None,
            read_coverage: None,
            pair_read_coverage: None,
            align_count: None,
            read_cov_max_paths: 0,
            tags: BTreeSet::new(),
            phase_ids: BTreeSet::new(),
            sub_assemblies: Vec::new(),
            seqset_entries: SeqsetPath::new(),
            rc_seqset_entries: SeqsetPath::new(),
            ml_features: None,
        }
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.tags.insert(tag.into());
    }
}

/// Everything that can be wrong with an otherwise well-typed `Assembly`.
/// Surfaced via [`check_assembly`], which every pipeline stage is
/// expected to call in debug builds after producing a new assembly.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AssemblyInvariantViolation {
    #[error("right_offset {right} < left_offset {left}")]
    OffsetsOutOfOrder { left: AOffset, right: AOffset },
    #[error("anchor lengths ({left_anchor} + {right_anchor}) exceed seq length {seq_len}")]
    AnchorsExceedSeq { left_anchor: u32, right_anchor: u32, seq_len: usize },
    #[error("left_anchor_len {left_anchor} exceeds offset span")]
    LeftAnchorExceedsSpan { left_anchor: u32 },
    #[error("matches_reference set but anchors are nonzero ({left_anchor}, {right_anchor})")]
    MatchesReferenceWithAnchors { left_anchor: u32, right_anchor: u32 },
    #[error("matches_reference set but seq.len() {seq_len} != right_offset - left_offset {span}")]
    MatchesReferenceLengthMismatch { seq_len: usize, span: AOffset },
    #[error("coverage.len() {got} != seq.len() + 1 = {expected}")]
    CoverageLengthMismatch { got: usize, expected: usize },
    #[error("aligned_variants are not sorted and non-overlapping")]
    AlignedVariantsNotPartitioned,
}

/// Verifies every invariant spec.md §3.6 lists for an `Assembly`.
pub fn check_assembly(a: &Assembly) -> Result<(), AssemblyInvariantViolation> {
    if let (Some(left), Some(right)) = (left_offset_val(a), right_offset_val(a)) {
        if right < left {
            return Err(AssemblyInvariantViolation::OffsetsOutOfOrder { left, right });
        }
        if (a.left_anchor_len as AOffset) > (right - left) {
            return Err(AssemblyInvariantViolation::LeftAnchorExceedsSpan { left_anchor: a.left_anchor_len });
        }
    }
    if (a.left_anchor_len + a.right_anchor_len) as usize > a.seq.len() {
        return Err(AssemblyInvariantViolation::AnchorsExceedSeq {
            left_anchor: a.left_anchor_len,
            right_anchor: a.right_anchor_len,
            seq_len: a.seq.len(),
        });
    }
    if a.matches_reference {
        if a.left_anchor_len != 0 || a.right_anchor_len != 0 {
            return Err(AssemblyInvariantViolation::MatchesReferenceWithAnchors {
                left_anchor: a.left_anchor_len,
                right_anchor: a.right_anchor_len,
            });
        }
        if let (Some(left), Some(right)) = (left_offset_val(a), right_offset_val(a)) {
            let span = right - left;
            if a.seq.len() as AOffset != span {
                return Err(AssemblyInvariantViolation::MatchesReferenceLengthMismatch { seq_len: a.seq.len(), span });
            }
        }
    }
    if !a.coverage.is_empty() && a.coverage.len() != a.seq.len() + 1 {
        return Err(AssemblyInvariantViolation::CoverageLengthMismatch {
            got: a.coverage.len(),
            expected: a.seq.len() + 1,
        });
    }
    if !aligned_variants_partitioned(&a.aligned_variants) {
        return Err(AssemblyInvariantViolation::AlignedVariantsNotPartitioned);
    }
    Ok(())
}

fn left_offset_val(a: &Assembly) -> Option<AOffset> {
    a.left_offset.is_present().then(|| a.left_offset.get())
}

fn right_offset_val(a: &Assembly) -> Option<AOffset> {
    a.right_offset.is_present().then(|| a.right_offset.get())
}

fn aligned_variants_partitioned(vars: &[AlignedVar]) -> bool {
    vars.windows(2).all(|w| w[0].right_offset <= w[1].left_offset)
}

/// The simpler of the two declarable stage orderings (spec.md §4.4):
/// just `left_offset` ascending, unanchored assemblies sorting first.
pub fn left_offset_less_than(a: &Assembly, b: &Assembly) -> std::cmp::Ordering {
    a.left_offset.0.unwrap_or(AOffset::MIN).cmp(&b.left_offset.0.unwrap_or(AOffset::MIN))
}

/// Canonical ordering used for every sorted pipeline stage output
/// (spec.md §4.4): `min(left,right)` ascending; reference-only first;
/// fully-anchored before half-anchored; `max(left,right)` descending; by
/// `seq` to cluster identical sequences for dedup; then by tags, anchor
/// lengths, score, pair-match counts, `rc_read_ids` size, `seq`
/// descending, and finally `assembly_id` for total determinism.
pub fn canon_assembly_order(a: &Assembly, b: &Assembly) -> std::cmp::Ordering {
    let min_max = |x: &Assembly| -> (AOffset, AOffset) {
        match (x.left_offset.0, x.right_offset.0) {
            (Some(l), Some(r)) => (l.min(r), l.max(r)),
            (Some(l), None) => (l, l),
            (None, Some(r)) => (r, r),
            (None, None) => (AOffset::MIN, AOffset::MIN),
        }
    };
    let (a_min, a_max) = min_max(a);
    let (b_min, b_max) = min_max(b);
    let anchored_rank = |x: &Assembly| -> u8 {
        match (x.left_offset.is_present(), x.right_offset.is_present()) {
            (true, true) => 0,
            _ => 1,
        }
    };

    a_min
        .cmp(&b_min)
        .then_with(|| b.matches_reference.cmp(&a.matches_reference))
        .then_with(|| anchored_rank(a).cmp(&anchored_rank(b)))
        .then_with(|| b_max.cmp(&a_max))
        .then_with(|| a.seq.cmp(&b.seq))
        .then_with(|| a.tags.cmp(&b.tags))
        .then_with(|| (a.left_anchor_len, a.right_anchor_len).cmp(&(b.left_anchor_len, b.right_anchor_len)))
        .then_with(|| a.score.cmp(&b.score))
        .then_with(|| {
            (a.left_pair_matches.len(), a.right_pair_matches.len())
                .cmp(&(b.left_pair_matches.len(), b.right_pair_matches.len()))
        })
        .then_with(|| a.rc_read_ids.len().cmp(&b.rc_read_ids.len()))
        .then_with(|| b.seq.cmp(&a.seq))
        .then_with(|| a.assembly_id.cmp(&b.assembly_id))
}
