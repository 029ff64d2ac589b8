//! `biograph discovery`: the variant-discovery sub-command (spec.md §6.2).

use std::cell::RefCell;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::AtomicBool;

use clap::Args as ClapArgs;
use serde::{Deserialize, Serialize};

use crate::assembly::Assembly;
use crate::common::AssembleOptionsBuilder;
use crate::err::AppError;
use crate::pipeline::compose::{build_pipeline, PipelineOptions};
use crate::pipeline::genotype::call_genotype;
use crate::pipeline::{ExpectedOrder, Stage};
use crate::readmap::{Read, Readmap};
use crate::reference::{Reference, ScaffoldInfo};
use crate::seqset::Seqset;
use crate::spiral_file;
use crate::tracer::{BidirectionalTracer, PopTracer, PushTracer, Tracer};
use crate::vcf_out::{VcfRecord, VcfWriter, VcfWriterOptions};
use crate::dna::Seq;

#[derive(Debug, Clone, ClapArgs)]
pub struct Args {
    /// Directory holding the built seqset/readmap/refmap (a `biograph
    /// build` output).
    #[arg(long = "in")]
    pub in_dir: PathBuf,

    /// Directory holding the reference FASTA and its scaffold index.
    #[arg(long = "ref")]
    pub ref_dir: PathBuf,

    /// Output VCF path.
    #[arg(long = "out")]
    pub out: PathBuf,

    /// Select a readmap inside a multi-sample bgdir.
    #[arg(long)]
    pub sample: Option<String>,

    /// Restrict discovery to BED regions.
    #[arg(long)]
    pub bed: Option<PathBuf>,

    /// Fraction of read length required for a seqset context to count
    /// as overlapping support.
    #[arg(long = "min-overlap", default_value_t = 0.7)]
    pub min_overlap: f64,

    #[arg(long = "max-ploids", default_value_t = 4)]
    pub max_ploids: usize,

    #[arg(long = "assemblies-out")]
    pub assemblies_out: Option<PathBuf>,

    #[arg(long = "aligned-assemblies-out")]
    pub aligned_assemblies_out: Option<PathBuf>,

    #[arg(long = "half-aligned-out")]
    pub half_aligned_out: Option<PathBuf>,

    /// Cache/reuse a previously built ref-map.
    #[arg(long = "ref-map")]
    pub ref_map: Option<PathBuf>,

    #[arg(short = 'f', long)]
    pub force: bool,

    #[arg(long, default_value = "auto")]
    pub threads: String,

    #[arg(long)]
    pub tmp: Option<PathBuf>,

    #[arg(long = "keep-tmp")]
    pub keep_tmp: bool,

    /// Touch seqset/readmap pages into RAM before tracing.
    #[arg(long)]
    pub cache: bool,

    #[arg(long)]
    pub stats: Option<PathBuf>,

    #[arg(long = "verify-assemble")]
    pub verify_assemble: bool,

    #[arg(long = "enable-pop-tracer", default_value_t = true)]
    pub enable_pop_tracer: bool,

    #[arg(long = "use-bidir-tracer", default_value_t = true)]
    pub use_bidir_tracer: bool,

    #[arg(long = "rvg-exclude")]
    pub rvg_exclude: bool,

    #[arg(long = "simple-gt")]
    pub simple_gt: bool,

    #[arg(long = "min-pop-overlap", default_value_t = 0.5)]
    pub min_pop_overlap: f64,

    #[arg(long = "report-long-traces")]
    pub report_long_traces: bool,
}

impl Args {
    pub fn resolve_threads(&self) -> Result<usize, AppError> {
        if self.threads == "auto" {
            return Ok(std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1));
        }
        self.threads
            .parse()
            .map_err(|_| AppError::invalid_argument(format!("--threads: not 'auto' or an integer: {:?}", self.threads)))
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !(0.5..=0.9).contains(&self.min_overlap) {
            return Err(AppError::invalid_argument(format!(
                "--min-overlap must be within 0.5..=0.9, got {}",
                self.min_overlap
            )));
        }
        if self.out.exists() && !self.force {
            return Err(AppError::invalid_argument(format!(
                "{} already exists; pass --force to overwrite",
                self.out.display()
            )));
        }
        Ok(())
    }
}

/// Runs variant discovery end to end: loads the built bgdir and
/// reference, runs the tracer/aligner/normalize/coverage/dedup/ploid/
/// phase pipeline per scaffold, and writes the resulting VCF.
///
/// Thread-pool dispatch across scaffold chunks is out of scope (spec.md
/// §1 Non-goals name the thread pool itself as external); each scaffold
/// is traced and piped through sequentially on the calling thread.
pub fn run(args: &Args) -> Result<(), AppError> {
    args.validate()?;
    let _threads = args.resolve_threads()?;
    tracing::info!(r#in = %args.in_dir.display(), out = %args.out.display(), "starting discovery");

    let reference = load_reference(&args.ref_dir)?;
    let bgdir = spiral_file::Reader::open(&args.in_dir)?;
    let seqset = load_seqset(&bgdir)?;
    let readmap = load_readmap(&bgdir, args.sample.as_deref())?;

    let min_overlap_bases = ((args.min_overlap * readmap.max_read_len() as f64).round() as usize).max(1);
    let options = AssembleOptionsBuilder::default()
        .min_overlap(min_overlap_bases)
        .max_ploids(args.max_ploids)
        .enable_bidirectional(args.use_bidir_tracer)
        .build()
        .map_err(|e| AppError::internal(e.to_string()))?;

    let regions = match &args.bed {
        Some(path) => load_bed(path)?,
        None => Vec::new(),
    };

    let writer_options = VcfWriterOptions {
        sv_size_threshold: crate::vcf_out::DEFAULT_SV_SIZE_THRESHOLD,
        sample_name: args.sample.clone().unwrap_or_else(|| "SAMPLE".to_string()),
    };
    let out_file = BufWriter::new(File::create(&args.out)?);
    let writer = Rc::new(RefCell::new(VcfWriter::new(out_file, writer_options)?));

    let cancel = AtomicBool::new(false);

    for scaffold_id in 0..reference.scaffolds.len() {
        let scaffold_name = reference.scaffolds[scaffold_id].name.clone();
        let scaffold_len = reference.scaffolds[scaffold_id].len;
        let windows: Vec<(usize, usize)> = if regions.is_empty() {
            vec![(0, scaffold_len)]
        } else {
            regions
                .iter()
                .filter(|r| r.scaffold == scaffold_name)
                .map(|r| (r.start.min(scaffold_len), r.end.min(scaffold_len)))
                .filter(|(start, end)| start < end)
                .collect()
        };
        if windows.is_empty() {
            continue;
        }

        let pipeline_options = PipelineOptions { scaffold_id, max_ploids: args.max_ploids, ..Default::default() };
        let sink = VcfEmitter { writer: writer.clone(), reference: &reference };
        let mut pipeline = build_pipeline(&reference, &seqset, &readmap, pipeline_options, sink);

        for (start, end) in windows {
            let push = PushTracer { seqset: &seqset, readmap: &readmap, reference: &reference, options: &options, scaffold_id, start, end };
            push.trace(&mut pipeline, &cancel);

            if args.enable_pop_tracer {
                let pop = PopTracer { seqset: &seqset, readmap: &readmap, reference: &reference, options: &options, scaffold_id, start, end };
                pop.trace(&mut pipeline, &cancel);
            }

            let bidir = BidirectionalTracer { seqset: &seqset, readmap: &readmap, reference: &reference, options: &options, scaffold_id, start, end };
            bidir.trace(&mut pipeline, &cancel);
        }

        pipeline.flush();
    }

    Ok(())
}

/// Locates the reference FASTA under `ref_dir` and parses it into
/// [`Reference`]'s scaffold table. FASTA import itself (beyond this flat
/// read) is out of scope (spec.md §1 Non-goals); N runs split scaffolds
/// into extents the way [`ScaffoldInfo::from_str_with_n`] always does.
fn load_reference(ref_dir: &Path) -> Result<Reference, AppError> {
    let fasta_path = std::fs::read_dir(ref_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| matches!(p.extension().and_then(|e| e.to_str()), Some("fa") | Some("fasta") | Some("fna")))
        .ok_or_else(|| AppError::format(format!("no .fa/.fasta/.fna file found in {}", ref_dir.display())))?;

    let text = std::fs::read_to_string(&fasta_path)?;
    let mut scaffolds = Vec::new();
    let mut cur_name: Option<String> = None;
    let mut cur_seq = String::new();
    for line in text.lines() {
        if let Some(name) = line.strip_prefix('>') {
            if let Some(prev) = cur_name.take() {
                scaffolds.push(ScaffoldInfo::from_str_with_n(prev, &cur_seq));
                cur_seq.clear();
            }
            cur_name = Some(name.split_whitespace().next().unwrap_or(name).to_string());
        } else {
            cur_seq.push_str(line.trim());
        }
    }
    if let Some(prev) = cur_name {
        scaffolds.push(ScaffoldInfo::from_str_with_n(prev, &cur_seq));
    }
    if scaffolds.is_empty() {
        return Err(AppError::format(format!("no scaffolds found in {}", fasta_path.display())));
    }
    Ok(Reference::new(scaffolds))
}

/// On-disk JSON encoding of a seqset part: every context's canonical
/// "ACGT" string, written by `biograph build`'s (stubbed) seqset writer
/// and read back here via [`crate::spiral_file`].
#[derive(Debug, Serialize, Deserialize)]
struct SeqsetPart {
    contexts: Vec<String>,
}

fn load_seqset(reader: &spiral_file::Reader) -> Result<Seqset, AppError> {
    let bytes = reader.get_path("seqset", "seqset", spiral_file::Version::new(1, 0, 0))?;
    let part: SeqsetPart = serde_json::from_slice(&bytes).map_err(|e| AppError::format(e.to_string()))?;
    let contexts = part
        .contexts
        .iter()
        .map(|s| Seq::parse(s).ok_or_else(|| AppError::format(format!("invalid seqset context: {s:?}"))))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Seqset::from_contexts(contexts))
}

/// On-disk JSON encoding of a readmap part, the serialized form of
/// [`crate::readmap::Read`].
#[derive(Debug, Serialize, Deserialize)]
struct ReadRecord {
    read_id: u64,
    seqset_id: u64,
    len: usize,
    is_forward: bool,
    mate_read_id: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ReadmapPart {
    has_mate_loop: bool,
    reads: Vec<ReadRecord>,
}

fn load_readmap(reader: &spiral_file::Reader, sample: Option<&str>) -> Result<Readmap, AppError> {
    let part_name = match sample {
        Some(s) => format!("readmap_{s}"),
        None => "readmap".to_string(),
    };
    let bytes = reader.get_path(&part_name, "readmap", spiral_file::Version::new(1, 0, 0))?;
    let part: ReadmapPart = serde_json::from_slice(&bytes).map_err(|e| AppError::format(e.to_string()))?;
    let reads = part
        .reads
        .into_iter()
        .map(|r| Read { read_id: r.read_id, seqset_id: r.seqset_id, len: r.len, is_forward: r.is_forward, mate_read_id: r.mate_read_id })
        .collect();
    Ok(Readmap::new(reads, part.has_mate_loop))
}

/// One `--bed`-restricted scaffold interval (spec.md §6.2 `--bed`).
struct BedRegion {
    scaffold: String,
    start: usize,
    end: usize,
}

fn load_bed(path: &Path) -> Result<Vec<BedRegion>, AppError> {
    let text = std::fs::read_to_string(path)?;
    let mut regions = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("track") || line.starts_with("browser") {
            continue;
        }
        let mut fields = line.split_whitespace();
        let malformed = || AppError::format(format!("malformed BED line: {line:?}"));
        let scaffold = fields.next().ok_or_else(malformed)?.to_string();
        let start: usize = fields.next().and_then(|s| s.parse().ok()).ok_or_else(malformed)?;
        let end: usize = fields.next().and_then(|s| s.parse().ok()).ok_or_else(malformed)?;
        regions.push(BedRegion { scaffold, start, end });
    }
    Ok(regions)
}

/// Terminal pipeline sink: converts each fully-resolved [`Assembly`] into
/// a [`VcfRecord`] and streams it out, genotyping via
/// [`crate::pipeline::genotype::call_genotype`]. Shares one writer (and
/// thus one VCF header) across every scaffold's pipeline instance via
/// `Rc<RefCell<_>>`.
struct VcfEmitter<'a, W: std::io::Write> {
    writer: Rc<RefCell<VcfWriter<W>>>,
    reference: &'a Reference,
}

impl<'a, W: std::io::Write> Stage for VcfEmitter<'a, W> {
    fn expected_order(&self) -> ExpectedOrder {
        ExpectedOrder::Canonical
    }

    fn add(&mut self, a: Assembly) {
        if a.matches_reference || !a.left_offset.is_present() || !a.right_offset.is_present() {
            return;
        }
        let left = a.left_offset.get() as usize;
        let right = a.right_offset.get() as usize;
        let pos = self.reference.get_seq_position(left);
        let scaffold_name = self.reference.scaffolds[pos.scaffold_id].name.clone();
        let ref_seq: String = (left..right).map(|p| self.reference.base_at(p).map(|b| b.to_char()).unwrap_or('N')).collect();
        let (genotype, genotype_quality) = call_genotype(&a);
        let alt_depth = a.coverage.iter().copied().min().unwrap_or(0);

        let record = VcfRecord {
            scaffold: scaffold_name,
            vcf_pos: (pos.position + 1) as u64,
            reference: ref_seq,
            alts: vec![a.seq.to_string()],
            genotype,
            depth: a.ref_depth + alt_depth,
            alt_depths: vec![alt_depth],
            genotype_quality,
            phase_id: a.phase_ids.iter().next().cloned(),
            assembly_id: Some(a.assembly_id),
        };
        if let Err(e) = self.writer.borrow_mut().write_record(&record) {
            tracing::error!(error = %e, assembly_id = a.assembly_id, "failed to write VCF record");
        }
    }

    fn flush(&mut self) {}
}
