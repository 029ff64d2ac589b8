//! Variant discovery tracers (spec.md §4.5).
//!
//! Three interchangeable engines share one contract: given an
//! [`crate::common::AssembleOptions`] and a scaffold range, call
//! `output.add(a)` zero or more times. Grounded in
//! `original_source/modules/variants/` discovery engines, generalized
//! into in-memory, single-scaffold-chunk implementations; the priority
//! queue cost model (push tracer) and two-pass popper/front match loop
//! (pop tracer) are carried over directly, while the packed on-disk
//! index structures they describe are replaced with plain `BTreeMap`s,
//! matching this crate's in-memory-first approach elsewhere.

pub mod bidirectional;
pub mod pop;
pub mod push;

pub use bidirectional::BidirectionalTracer;
pub use pop::PopTracer;
pub use push::PushTracer;

use crate::assembly::Assembly;
use crate::pipeline::Stage;

/// Shared entrypoint every tracer implements: trace a scaffold range,
/// emitting discovered assemblies to `output`.
pub trait Tracer {
    fn trace(&self, output: &mut dyn Stage, cancel: &std::sync::atomic::AtomicBool);
}

/// A `(path, seqset_id)` pair, used by the loop guard in the push tracer
/// and in the bidirectional tracer's seen-edge set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeenKey {
    pub offset: crate::assembly::AOffset,
    pub seqset_id: crate::seqset::SeqsetId,
}
