//! `biograph` binary entry point: CLI parsing, logging setup, and dispatch
//! into the library crate's [`cli::dispatch`].

use biograph::{cli, common};
use clap::Parser;

use biograph::err::{AppError, AppResult};

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Variant discovery for short-read DNA sequencing",
    long_about = "Traces, aligns, and genotypes variants from a built seqset/readmap \
                  against a reference, producing a VCF."
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::Args,

    /// The sub command to run
    #[command(subcommand)]
    command: cli::Commands,
}

fn main() -> AppResult {
    let cli = Cli::parse();

    let max_level = match cli.common.verbose.log_level() {
        Some(level) => match level {
            log::Level::Error => tracing::Level::ERROR,
            log::Level::Warn => tracing::Level::WARN,
            log::Level::Info => tracing::Level::INFO,
            log::Level::Debug => tracing::Level::DEBUG,
            log::Level::Trace => tracing::Level::TRACE,
        },
        None => tracing::Level::INFO,
    };
    let builder = tracing_subscriber::fmt().with_target(false).with_max_level(max_level).compact();
    let stderr_log = std::env::var_os("SPIRAL_LOG_STDERR").is_some();

    let result: Result<(), AppError> = if stderr_log {
        let collector = builder.with_writer(std::io::stderr).finish();
        tracing::subscriber::with_default(collector, || run(&cli))
    } else {
        let collector = builder.finish();
        tracing::subscriber::with_default(collector, || run(&cli))
    };
    result.into()
}

fn run(cli: &Cli) -> Result<(), AppError> {
    common::trace_rss_now();
    common::ProcessTitle::set("starting");
    cli::dispatch(&cli.command)
}
