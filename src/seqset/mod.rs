//! The seqset: a compact, ordered dictionary of every read and every suffix
//! of every read (spec.md §3.3, §4.1).
//!
//! The real on-disk storage layout (an append-only, memory-mappable bundle
//! of packed bit-vectors) is produced by a separate builder that is out of
//! scope here (spec.md §3.3); this module defines the in-memory
//! representation the rest of the core operates on plus the operations
//! contract, and a builder used by tests and by the `biograph build` CLI
//! path when no prebuilt seqset part is supplied (see
//! [`crate::testutil::build_seqset`]).
//!
//! Grounded in `original_source/modules/bio_base/seqset_test.cpp` and
//! `seqset_testutil.h` for behavior; the wire format itself
//! (`original_source/modules/bio_base/seqset_flat_test.cpp`) is replaced by
//! [`crate::spiral_file`]'s named-part container.
//!
//! ## Sort order
//!
//! A walk builds up a context by repeatedly *prepending* bases
//! (`push_front`), so the part of a context that is already fixed at any
//! point in a walk is always its **trailing** bases -- the newest base is
//! always at the front. For that to be a simple binary-search refinement
//! at each step, entries must be sorted by comparing them from their last
//! base backward (equivalently: sorted by their reversed content). That is
//! the seqset's sort order throughout this module; `entry_shared(id)` is
//! the common trailing-bases length (LCP) between consecutive entries
//! under that order.

use std::cmp::Ordering;

use crate::dna::{Base, Seq, Slice};

/// Dense index into the seqset's sorted table of contexts.
pub type SeqsetId = u64;

/// A context in the seqset: either some read in the sample, a suffix of a
/// read, or the empty sequence (spec.md §3.3).
#[derive(Debug, Clone)]
pub struct Context {
    seq: Seq,
}

impl Context {
    pub fn sequence(&self) -> Slice<'_> {
        self.seq.as_slice()
    }

    /// The trailing `len` bases of this context's content.
    pub fn sequence_len(&self, len: usize) -> Slice<'_> {
        self.seq.suffix(len)
    }

    pub fn truncate(&self, len: usize) -> Context {
        Context { seq: self.seq.suffix(len).to_owned_seq() }
    }

    pub fn rev_comp(&self) -> Context {
        Context { seq: self.seq.rev_comp() }
    }

    /// Number of trailing bases shared with `other`.
    pub fn shared_prefix_length(&self, other: &Context) -> usize {
        common_suffix_length(self.seq.as_slice(), other.seq.as_slice())
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }
}

/// A half-open index interval `[begin, end)` into the seqset, plus the
/// length of the trailing-bases context that every entry in the interval
/// shares (spec.md §3.3).
///
/// Invariants: every entry in the range shares the same `length`-base
/// trailing content; `begin + 1 == end` iff the context is unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    begin: SeqsetId,
    end: SeqsetId,
    length: usize,
}

impl Range {
    pub const INVALID: Range = Range { begin: 0, end: 0, length: 0 };

    /// Builds a range directly from already-known bounds, e.g. when
    /// reconstructing one from a serialized assembly. Callers are
    /// responsible for the sharing invariant; this does not re-verify it
    /// against a seqset.
    pub fn new(begin: SeqsetId, end: SeqsetId, length: usize) -> Range {
        Range { begin, end, length }
    }

    pub fn is_valid(&self) -> bool {
        self.begin < self.end
    }

    pub fn begin(&self) -> SeqsetId {
        self.begin
    }

    pub fn end(&self) -> SeqsetId {
        self.end
    }

    pub fn size(&self) -> u64 {
        self.end.saturating_sub(self.begin)
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn is_unique(&self) -> bool {
        self.is_valid() && self.end - self.begin == 1
    }

    pub fn matches(&self, id: SeqsetId) -> bool {
        id >= self.begin && id < self.end
    }
}

impl PartialOrd for Range {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Range {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.begin, self.end, self.length).cmp(&(other.begin, other.end, other.length))
    }
}

/// Length of the common trailing-bases run of `a` and `b`.
fn common_suffix_length(a: Slice<'_>, b: Slice<'_>) -> usize {
    let n = a.len().min(b.len());
    (1..=n).take_while(|&i| a.get(a.len() - i) == b.get(b.len() - i)).count()
}

fn reverse_seq(s: Slice<'_>) -> Seq {
    Seq::from_bases((0..s.len()).rev().map(|i| s.get(i)).collect())
}

/// Compares `entry`'s trailing `target_rev.len()` bases (expressed as the
/// reversed target) against `target_rev`, for use in the binary searches
/// behind [`Seqset::find`]. Entries shorter than the target can never
/// match and sort as `Less`.
fn rev_cmp_prefix(entry: &Seq, target_rev: Slice<'_>) -> Ordering {
    let erev = reverse_seq(entry.as_slice());
    let erev = erev.as_slice();
    let cmp_len = erev.len().min(target_rev.len());
    for i in 0..cmp_len {
        let ord = erev.get(i).cmp(&target_rev.get(i));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    erev.len().cmp(&target_rev.len())
}

/// The ordered dictionary itself.
///
/// This in-memory representation stores full sequences for simplicity and
/// testability; a production build would instead decode the packed
/// bit-vector bundle lazily, without changing any call site.
#[derive(Debug, Clone, Default)]
pub struct Seqset {
    /// Every context, sorted ascending by reversed content (see module docs).
    entries: Vec<Seq>,
    max_read_len: usize,
}

impl Seqset {
    /// Builds a seqset from an explicit set of contexts (including the
    /// empty context), sorting and deduplicating them. See
    /// [`crate::testutil::build_seqset`] for the read-derived builder used
    /// by tests.
    pub fn from_contexts(mut contexts: Vec<Seq>) -> Seqset {
        contexts.push(Seq::new());
        contexts.sort_by(|a, b| reverse_seq(a.as_slice()).cmp(&reverse_seq(b.as_slice())));
        contexts.dedup();
        let max_read_len = contexts.iter().map(Seq::len).max().unwrap_or(0);
        Seqset { entries: contexts, max_read_len }
    }

    pub fn size(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn max_read_len(&self) -> usize {
        self.max_read_len
    }

    /// The range representing the empty context, the starting point for
    /// every push-front walk.
    pub fn ctx_begin(&self) -> Range {
        self.find(Slice::new(&[]))
    }

    pub fn ctx_entry(&self, id: SeqsetId) -> Context {
        Context { seq: self.entries[id as usize].clone() }
    }

    pub fn entry_size(&self, id: SeqsetId) -> usize {
        self.entries[id as usize].len()
    }

    /// Shared trailing-bases length (LCP under the reversed sort order)
    /// with the preceding entry. Entry 0 always has 0.
    pub fn entry_shared(&self, id: SeqsetId) -> usize {
        if id == 0 {
            return 0;
        }
        common_suffix_length(
            self.entries[id as usize].as_slice(),
            self.entries[(id - 1) as usize].as_slice(),
        )
    }

    /// Binary search for the range of entries whose trailing `seq.len()`
    /// bases equal `seq`. Handles `seq.len() > entry_size` naturally (no
    /// entry that short can match, so the range comes back invalid).
    /// Returns an invalid range if no context matches (first-class "not
    /// found", never an error -- spec.md §4.1).
    pub fn find(&self, seq: Slice<'_>) -> Range {
        let target_rev = reverse_seq(seq);
        let target_rev = target_rev.as_slice();
        let lo = self.entries.partition_point(|e| rev_cmp_prefix(e, target_rev) == Ordering::Less);
        let hi = self.entries.partition_point(|e| rev_cmp_prefix(e, target_rev) != Ordering::Greater);
        if lo >= hi {
            Range::INVALID
        } else {
            Range { begin: lo as SeqsetId, end: hi as SeqsetId, length: seq.len() }
        }
    }

    /// Fast path used when the caller already knows `seq` must exist and
    /// is unique.
    pub fn find_existing(&self, seq: Slice<'_>) -> SeqsetId {
        let r = self.find(seq);
        assert!(r.is_valid(), "find_existing: no such context");
        r.begin
    }

    /// Like [`Seqset::find_existing`], but the caller additionally
    /// guarantees that the trailing `unique_prefix_len` bases of `seq`
    /// already uniquely determine the placement -- used by callers (such
    /// as the tracers) that have already narrowed to a single candidate
    /// and just need the terminal id.
    pub fn find_existing_unique(&self, seq: Slice<'_>, unique_prefix_len: usize) -> SeqsetId {
        let prefix_range = self.find(seq.suffix(unique_prefix_len));
        assert!(prefix_range.is_unique(), "find_existing_unique: prefix is not unique");
        prefix_range.begin
    }

    pub fn shared_prefix_length(&self, a: Range, b: Range) -> usize {
        if !a.is_valid() || !b.is_valid() {
            return 0;
        }
        common_suffix_length(
            self.entries[a.begin as usize].as_slice(),
            self.entries[b.begin as usize].as_slice(),
        )
    }

    /// Narrows `range` to the contexts that also match a new base `b`
    /// prepended to the front of the walked context.
    pub fn push_front(&self, range: Range, b: Base) -> Range {
        if !range.is_valid() {
            return Range::INVALID;
        }
        self.find(self.prepend(range, b).as_slice())
    }

    fn prepend(&self, range: Range, b: Base) -> Seq {
        let old_ctx = self.ctx_entry(range.begin).sequence_len(range.length).to_owned_seq();
        let mut new_ctx = Seq::new();
        new_ctx.push(b);
        for i in 0..old_ctx.len() {
            new_ctx.push(old_ctx.get(i));
        }
        new_ctx
    }

    /// Like [`Seqset::push_front`], but if the literal push would be
    /// invalid (no stored context is long enough, or the walk has run off
    /// the end of every read), progressively drops bases from the *tail*
    /// of the old matched content (the oldest, least-specific part of the
    /// walk) until a valid range is found, always keeping the newly
    /// pushed base `b`. Required to walk the seqset beyond the longest
    /// stored suffix (spec.md §3.3, §4.5.3).
    pub fn push_front_drop(&self, range: Range, b: Base) -> Range {
        let pushed = self.push_front(range, b);
        if pushed.is_valid() {
            return pushed;
        }
        if !range.is_valid() {
            return Range::INVALID;
        }
        let candidate = self.prepend(range, b);
        let mut len = candidate.len();
        while len > 0 {
            let r = self.find(candidate.prefix(len).as_slice());
            if r.is_valid() {
                return r;
            }
            len -= 1;
        }
        self.ctx_begin()
    }

    /// Removes one base from the front of the context(s) in `range`,
    /// returning the range for the shorter trailing context. The empty
    /// context's `pop_front` stays the empty context.
    pub fn pop_front(&self, range: Range) -> Range {
        if !range.is_valid() {
            return Range::INVALID;
        }
        if range.length == 0 {
            return range;
        }
        self.find(self.ctx_entry(range.begin).sequence_len(range.length - 1))
    }
}
