// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `run` and `inspect`, and the
// config flags they share.
//
// A config file supplies the base settings; every flag given on
// the command line overrides the matching field. RANK and
// WORLD_SIZE are also read from the environment so a launcher
// can start one process per rank with the same command line.
//
// Reference: Rust Book §12 (Building a CLI Program)

use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::domain::objective::Objective;
use crate::infra::config::{DeviceKind, SeqtrainConfig};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive the data pipeline through the training loop
    Run(RunArgs),

    /// Load every corpus file and report what each rank would see
    Inspect(InspectArgs),
}

/// Flags shared by every command.
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// JSON config file with `data` and `run` sections
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Root directory that holds dataset directories
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Dataset directory name under --data-dir
    #[arg(long)]
    pub dataset: Option<String>,

    /// Comma-separated training files; overrides the directory scan
    #[arg(long)]
    pub train_files: Option<String>,

    /// Comma-separated validation files
    #[arg(long)]
    pub validation_files: Option<String>,

    #[arg(long)]
    pub block_size: Option<usize>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long, value_parser = parse_objective)]
    pub objective: Option<Objective>,

    #[arg(long)]
    pub pad_token_id: Option<i32>,

    #[arg(long, env = "RANK")]
    pub rank: Option<usize>,

    #[arg(long, env = "WORLD_SIZE")]
    pub world_size: Option<usize>,

    #[arg(long, value_enum)]
    pub device: Option<DeviceKind>,
}

fn parse_objective(s: &str) -> Result<Objective, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| format!("unknown objective '{s}' (expected pretrain, instruction or preference)"))
}

impl TryFrom<ConfigArgs> for SeqtrainConfig {
    type Error = anyhow::Error;

    fn try_from(a: ConfigArgs) -> Result<Self> {
        let mut cfg = match &a.config {
            Some(path) => SeqtrainConfig::from_file(path)?,
            None       => SeqtrainConfig::default(),
        };
        let d = &mut cfg.data;

        if let Some(v) = a.data_dir         { d.data_dir = v; }
        if let Some(v) = a.dataset          { d.dataset = Some(v); }
        if let Some(v) = a.train_files      { d.train_files = Some(v); }
        if let Some(v) = a.validation_files { d.validation_files = Some(v); }
        if let Some(v) = a.block_size       { d.block_size = v; }
        if let Some(v) = a.batch_size       { d.batch_size = v; }
        if let Some(v) = a.objective        { d.objective = v; }
        if let Some(v) = a.pad_token_id     { d.pad_token_id = Some(v); }
        if let Some(v) = a.rank             { d.rank = v; }
        if let Some(v) = a.world_size       { d.world_size = v; }
        if let Some(v) = a.device           { d.device = v; }

        Ok(cfg)
    }
}

/// All arguments for the `run` command
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Directory for checkpoints and metrics
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    #[arg(long)]
    pub max_iters: Option<usize>,

    /// Continue from the checkpoint named by <out_dir>/latest.json
    #[arg(long)]
    pub resume: bool,

    /// Build every batch on the calling thread
    #[arg(long)]
    pub no_prefetch: bool,

    /// Sample training batches at random instead of walking files in order
    #[arg(long)]
    pub random: bool,
}

impl TryFrom<RunArgs> for SeqtrainConfig {
    type Error = anyhow::Error;

    fn try_from(a: RunArgs) -> Result<Self> {
        let mut cfg = SeqtrainConfig::try_from(a.config)?;
        if let Some(v) = a.out_dir   { cfg.run.out_dir = v; }
        if let Some(v) = a.max_iters { cfg.run.max_iters = v; }
        if a.no_prefetch { cfg.data.prefetch = false; }
        if a.random      { cfg.data.sequential = false; }
        Ok(cfg)
    }
}

/// All arguments for the `inspect` command
#[derive(Args, Debug)]
pub struct InspectArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn run_args(config: ConfigArgs) -> RunArgs {
        RunArgs { config, out_dir: None, max_iters: Some(7), resume: false, no_prefetch: true, random: false }
    }

    #[test]
    fn test_flags_override_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "data": {{ "block_size": 128, "batch_size": 4 }}, "run": {{ "max_iters": 10 }} }}"#).unwrap();

        let args = ConfigArgs {
            config:     Some(file.path().to_path_buf()),
            batch_size: Some(16),
            objective:  Some(Objective::Instruction),
            ..Default::default()
        };
        let cfg = SeqtrainConfig::try_from(run_args(args)).unwrap();

        assert_eq!(cfg.data.block_size, 128);
        assert_eq!(cfg.data.batch_size, 16);
        assert_eq!(cfg.data.objective, Objective::Instruction);
        assert!(!cfg.data.prefetch);
        assert!(cfg.data.sequential);
        assert_eq!(cfg.run.max_iters, 7);
    }

    #[test]
    fn test_objective_parser() {
        assert_eq!(parse_objective("preference"), Ok(Objective::Preference));
        assert!(parse_objective("sft").is_err());
    }
}
