// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `run`     — drives the pipeline through the training loop
//   2. `inspect` — reports what every corpus file yields per rank
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, InspectArgs, RunArgs};

use crate::infra::config::SeqtrainConfig;

#[derive(Parser, Debug)]
#[command(
    name = "seqtrain",
    version,
    about = "Sequential, rank-sharded, resumable data pipeline for LM training."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Run(args)     => run(args),
            Commands::Inspect(args) => inspect(args),
        }
    }
}

fn run(args: RunArgs) -> Result<()> {
    use crate::application::run_use_case::RunUseCase;

    let resume = args.resume;
    let config = SeqtrainConfig::try_from(args)?;
    let summary = RunUseCase::new(config, resume).execute()?;

    println!(
        "Run complete: {} iterations, {} tokens, epoch {}.",
        summary.iters, summary.processed_tokens, summary.epoch
    );
    Ok(())
}

fn inspect(args: InspectArgs) -> Result<()> {
    use crate::application::inspect_use_case::{FileStatus, InspectUseCase};

    let config  = SeqtrainConfig::try_from(args.config)?;
    let reports = InspectUseCase::new(config).execute()?;

    for r in &reports {
        match &r.status {
            FileStatus::Loaded { format, samples, tokens } => println!(
                "{:<5} {}  {} · {} samples · {} tokens",
                r.split,
                r.path.display(),
                format,
                samples,
                tokens
            ),
            FileStatus::Skipped => println!("{:<5} {}  skipped (too small)", r.split, r.path.display()),
        }
    }
    Ok(())
}
