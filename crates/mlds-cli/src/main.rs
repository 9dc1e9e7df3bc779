//! mlds-gam: difference scale comparison for MLDS triad experiments.
//!
//! CLI entry point using clap for argument parsing.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "mlds-gam",
    version,
    about = "Compare MLDS difference scales across experiment blocks with binomial GAMs",
    long_about = "Fits a pooled and a per-segment binomial GAM to triad judgments and tests\n\
                  whether the segments share one perceptual scale (analysis of deviance)."
)]
struct Cli {
    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare the scales of several files, or of chunks of one file
    Compare(commands::compare::CompareArgs),
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
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("mlds-gam v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Compare(args) => commands::compare::run(args),
    }
}
