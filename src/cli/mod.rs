//! Top-level CLI surface: one `biograph` binary with `discovery` and
//! `build` sub-commands (spec.md §6.2).

pub mod build;
pub mod discovery;

use crate::err::AppError;

#[derive(Debug, clap::Subcommand)]
pub enum Commands {
    /// Variant discovery: traces, aligns, and genotypes against a
    /// reference, producing a VCF.
    Discovery(discovery::Args),

    /// Deprecated alias for `discovery`, kept for the duration of one
    /// release so existing scripts get a clear pointer instead of a
    /// parse error.
    #[command(hide = true)]
    Variants(discovery::Args),

    /// Builds a bgdir (seqset/readmap/ref-map) from raw reads.
    Build(build::Args),
}

pub fn dispatch(command: &Commands) -> Result<(), AppError> {
    match command {
        Commands::Discovery(args) => discovery::run(args),
        Commands::Variants(_) => {
            eprintln!("Error: `biograph variants` has been renamed to `biograph discovery`");
            Err(AppError::invalid_argument("`variants` is deprecated; use `discovery`"))
        }
        Commands::Build(args) => build::run(args),
    }
}
