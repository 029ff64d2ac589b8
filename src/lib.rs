//! BioGraph: variant-discovery core for short-read DNA sequencing.

pub mod aligner;
pub mod assembly;
pub mod cli;
pub mod common;
pub mod dna;
pub mod err;
pub mod pipeline;
pub mod readmap;
pub mod reference;
pub mod refmap;
pub mod seqset;
pub mod spiral_file;
pub mod tracer;
pub mod vcf_out;

pub mod testutil;
