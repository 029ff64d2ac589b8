//! `biograph build`: constructs a bgdir (seqset + readmap + ref-map)
//! from FASTQ/BAM input, the producer side of the format `discovery`
//! consumes.

use std::path::PathBuf;

use clap::Args as ClapArgs;

use crate::err::AppError;

#[derive(Debug, Clone, ClapArgs)]
pub struct Args {
    /// One or more FASTQ/BAM input files.
    #[arg(long = "reads", required = true)]
    pub reads: Vec<PathBuf>,

    /// Output bgdir path.
    #[arg(long = "out")]
    pub out: PathBuf,

    #[arg(short = 'f', long)]
    pub force: bool,

    #[arg(long, default_value = "auto")]
    pub threads: String,
}

impl Args {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.reads.is_empty() {
            return Err(AppError::invalid_argument("--reads requires at least one path"));
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

/// Builds a bgdir: this is the seam the seqset/readmap/ref-map
/// construction pipeline attaches to once a FASTQ/BAM reader is wired
/// in (out of scope for the core's own spec.md, which begins at an
/// already-built seqset — spec.md §1 Non-goals).
pub fn run(args: &Args) -> Result<(), AppError> {
    args.validate()?;
    tracing::info!(out = %args.out.display(), reads = args.reads.len(), "starting build");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_an_empty_reads_list() {
        let args = Args { reads: vec![], out: "/tmp/x".into(), force: false, threads: "auto".into() };
        assert!(args.validate().is_err());
    }
}
