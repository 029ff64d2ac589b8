//! Wires the individual stages into the single streaming chain spec.md
//! §2's data-flow diagram describes, from `ref_trimmer` through
//! `split_phases`. Raw tracer output (half-aligned, unsorted assemblies)
//! enters at the front; fully genotyped, phase-split assemblies come out
//! the back ready for [`crate::vcf_out`] to turn into `VcfRecord`s.
//!
//! Loading a bgdir and reference off disk into [`Seqset`]/[`Readmap`]/
//! [`Reference`] and dispatching the tracers per scaffold chunk is not
//! done here; this module only composes the post-tracer stage chain.

use crate::aligner::{AlignSplitterStage, AlignerOptions, AlignerStage};
use crate::assembly::Assembly;
use crate::pipeline::coverage::{CoverageCalculator, CoverageOptions};
use crate::pipeline::dedup::{Deduper, ExactDeduper, RefTrimmer};
use crate::pipeline::genotype::{GenotypeOptions, SimpleGenotypeFilter};
use crate::pipeline::normalize::{Normalizer, Padder};
use crate::pipeline::phase::{new_phase_arena, PhaseJoiner, PhaseSplitter};
use crate::pipeline::ploid::{PloidLimiter, RvgExclude};
use crate::pipeline::{ExpectedOrder, Stage};
use crate::readmap::Readmap;
use crate::reference::Reference;
use crate::seqset::Seqset;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub scaffold_id: usize,
    pub aligner: AlignerOptions,
    pub coverage: CoverageOptions,
    pub genotype: GenotypeOptions,
    pub max_ploids: usize,
    pub sv_size_threshold: usize,
    pub max_phase_len: i64,
    pub max_phase_asm_len: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            scaffold_id: 0,
            aligner: AlignerOptions::default(),
            coverage: CoverageOptions::default(),
            genotype: GenotypeOptions::default(),
            max_ploids: 4,
            sv_size_threshold: crate::vcf_out::DEFAULT_SV_SIZE_THRESHOLD,
            max_phase_len: 1000,
            max_phase_asm_len: 10_000,
        }
    }
}

/// Terminal sink: collects every emitted assembly into a `Vec`, for tests
/// and for callers that build `VcfRecord`s from the pipeline's output
/// themselves.
pub struct Collector(pub Vec<Assembly>);

impl Collector {
    pub fn new() -> Self {
        Collector(Vec::new())
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for Collector {
    fn expected_order(&self) -> ExpectedOrder {
        ExpectedOrder::Canonical
    }

    fn add(&mut self, a: Assembly) {
        self.0.push(a);
    }

    fn flush(&mut self) {}
}

/// Builds the full post-tracer pipeline ending at `sink`:
/// `ref_trimmer -> deduper -> aligner -> align_splitter -> normalizer ->
/// exact_deduper -> vcf_padder -> calc_coverage -> simple_genotype_filter
/// -> ploid_limiter -> rvg_exclude -> join_phases -> split_phases -> sink`.
pub fn build_pipeline<'a, S: Stage + 'a>(
    reference: &'a Reference,
    seqset: &'a Seqset,
    readmap: &'a Readmap,
    options: PipelineOptions,
    sink: S,
) -> impl Stage + 'a {
    let arena = new_phase_arena();
    let splitter = PhaseSplitter::new(sink, arena.clone());
    let joiner = PhaseJoiner::new(splitter, options.max_phase_len, options.max_phase_asm_len, arena);
    let rvg = RvgExclude::new(joiner, options.sv_size_threshold);
    let ploid = PloidLimiter::new(rvg, options.max_ploids);
    let genotype = SimpleGenotypeFilter::new(ploid, options.genotype);
    let coverage = CoverageCalculator::new(genotype, seqset, readmap, options.coverage);
    let padder = Padder::new(coverage, reference);
    let exact_dedup = ExactDeduper::new(padder);
    let normalizer = Normalizer::new(exact_dedup, reference);
    let split = AlignSplitterStage::new(normalizer);
    let aligner = AlignerStage::new(split, reference, options.scaffold_id, options.aligner);
    let dedup = Deduper::new(aligner);
    RefTrimmer::new(dedup, reference)
}
