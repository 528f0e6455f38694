//! mqm: Multiple-QTL-Mapping for experimental crosses.
//!
//! CLI entry point using clap for argument parsing.

mod commands;
mod input;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "mqm",
    version,
    about = "MQM-RS: Multiple-QTL-Mapping genome scans",
    long_about = "A Rust implementation of multiple-QTL mapping for F2, backcross,\n\
                  and RIL populations: cofactor selection, EM mixture scanning,\n\
                  and permutation thresholds."
)]
struct Cli {
    /// Number of threads to use
    #[arg(long, default_value = "1", global = true)]
    threads: usize,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a genome scan (optionally with backward elimination and permutations)
    Scan(commands::scan::ScanArgs),

    /// Parse and validate the input files without scanning
    Check(commands::check::CheckArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.threads)
        .build_global()
        .ok();

    tracing::info!("MQM-RS v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Using {} threads", cli.threads);

    match cli.command {
        Commands::Scan(args) => commands::scan::run(args),
        Commands::Check(args) => commands::check::run(args),
    }
}
