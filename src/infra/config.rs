// ============================================================
// Layer 6 — Configuration
// ============================================================
// All settings for a run, loaded from a JSON file with two
// sections and overridden by CLI flags:
//
//   {
//     "data": { ... PipelineConfig ... },
//     "run":  { ... RunConfig ... }
//   }
//
// Every field has a default, so a config file only needs the
// fields that differ. The whole struct is also written into each
// trainer checkpoint so a resumed run can be audited.
//
// Reference: serde documentation (#[serde(default)])
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};

use crate::domain::{error::PipelineError, objective::Objective};

// ─── DeviceKind ───────────────────────────────────────────────────────────────
/// Where batches end up. Accelerators get their upload issued from the
/// prefetch worker; the CPU gets a synchronous copy on the caller's thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Cpu,
    Wgpu,
}

impl DeviceKind {
    pub fn is_accelerator(self) -> bool {
        !matches!(self, DeviceKind::Cpu)
    }
}

// ─── BatchSizeSchedule ────────────────────────────────────────────────────────
/// Linear batch-size warmup: start at `initial` and grow by one sample
/// every `max_iter / 100` iterations until `batch_size` is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSizeSchedule {
    pub initial:  usize,
    pub max_iter: usize,
}

// ─── PipelineConfig ───────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root directory that holds dataset directories
    pub data_dir:               PathBuf,
    /// Dataset directory name under `data_dir`
    pub dataset:                Option<String>,
    /// Comma-separated explicit training files; overrides the directory scan
    pub train_files:            Option<String>,
    /// Comma-separated explicit validation files
    pub validation_files:       Option<String>,
    pub train_file_prefix:      String,
    pub validation_file_prefix: String,

    pub block_size:             usize,
    /// Batch size, or the ramp target when a schedule is set
    pub batch_size:             usize,
    pub batch_size_schedule:    Option<BatchSizeSchedule>,

    pub world_size:             usize,
    pub rank:                   usize,
    pub device:                 DeviceKind,

    /// Structured samples shorter than block_size are padded with this token.
    /// Without it they must already be exactly block_size long.
    pub pad_token_id:           Option<i32>,
    pub ignore_index:           i32,
    pub weighted_loss:          bool,
    pub objective:              Objective,

    /// Walk the training split in file/offset order instead of sampling
    pub sequential:             bool,
    pub start_offset:           Option<usize>,
    /// Treat the first N training files as already consumed
    pub processed_files_count:  usize,
    pub prefetch:               bool,
    pub seed:                   u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir:               PathBuf::from("data"),
            dataset:                None,
            train_files:            None,
            validation_files:       None,
            train_file_prefix:      "train".to_string(),
            validation_file_prefix: "val".to_string(),
            block_size:             1024,
            batch_size:             8,
            batch_size_schedule:    None,
            world_size:             1,
            rank:                   0,
            device:                 DeviceKind::Cpu,
            pad_token_id:           None,
            ignore_index:           -100,
            weighted_loss:          false,
            objective:              Objective::Pretrain,
            sequential:             true,
            start_offset:           None,
            processed_files_count:  0,
            prefetch:               true,
            seed:                   1337,
        }
    }
}

impl PipelineConfig {
    /// Tokens per continuous sample: one more than the context so that
    /// inputs and targets can both be cut from the same window.
    pub fn sample_size(&self) -> usize {
        self.block_size + 1
    }

    /// Reject combinations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.block_size == 0 {
            return Err(PipelineError::invalid_config("block_size must be positive"));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::invalid_config("batch_size must be positive"));
        }
        if self.world_size == 0 {
            return Err(PipelineError::invalid_config("world_size must be positive"));
        }
        if self.rank >= self.world_size {
            return Err(PipelineError::invalid_config(format!(
                "rank {} is out of range for world_size {}",
                self.rank, self.world_size
            )));
        }
        if let Some(schedule) = self.batch_size_schedule {
            if schedule.initial == 0 || schedule.initial > self.batch_size {
                return Err(PipelineError::invalid_config(format!(
                    "batch_size_schedule.initial must be in 1..={}, got {}",
                    self.batch_size, schedule.initial
                )));
            }
        }
        Ok(())
    }
}

// ─── RunConfig ────────────────────────────────────────────────────────────────
/// Settings of the iteration loop that drives the pipeline.
/// An interval of 0 disables the corresponding action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub out_dir:             PathBuf,
    pub max_iters:           usize,
    pub eval_interval:       usize,
    pub eval_iters:          usize,
    pub log_interval:        usize,
    pub checkpoint_interval: usize,
    pub grad_accum:          usize,
    /// Rebuild loaded corpus files from disk every N iterations
    pub reload_interval:     usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            out_dir:             PathBuf::from("out"),
            max_iters:           1000,
            eval_interval:       200,
            eval_iters:          20,
            log_interval:        10,
            checkpoint_interval: 500,
            grad_accum:          1,
            reload_interval:     0,
        }
    }
}

// ─── SeqtrainConfig ───────────────────────────────────────────────────────────
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeqtrainConfig {
    pub data: PipelineConfig,
    pub run:  RunConfig,
}

impl SeqtrainConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config from '{}'", path.display()))?;
        let config: SeqtrainConfig = serde_json::from_str(&json)
            .with_context(|| format!("Cannot parse config '{}'", path.display()))?;
        Ok(config)
    }
}
