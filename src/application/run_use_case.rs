// ============================================================
// Layer 2 — RunUseCase
// ============================================================
// Orchestrates a training run in order:
//
//   Step 1: Pick the backend for the configured device
//   Step 2: Build the data loader        (Layer 4 - data)
//   Step 3: Build the trainer            (Layer 5 - ml)
//   Step 4: Restore the latest checkpoint when resuming
//   Step 5: Run the iteration loop       (Layer 5 - ml)
//
// Reference: Burn Book §2 (Backends)

use anyhow::{Context, Result};
use burn::prelude::Backend;

use crate::data::loader::DataLoader;
use crate::infra::config::{DeviceKind, SeqtrainConfig};
use crate::ml::{
    step::DryRunStep,
    trainer::{RunSummary, Trainer},
};

pub struct RunUseCase {
    config: SeqtrainConfig,
    resume: bool,
}

impl RunUseCase {
    pub fn new(config: SeqtrainConfig, resume: bool) -> Self {
        Self { config, resume }
    }

    pub fn execute(&self) -> Result<RunSummary> {
        // ── Step 1: Backend ───────────────────────────────────────────────────
        match self.config.data.device {
            DeviceKind::Cpu => {
                let device = burn::backend::ndarray::NdArrayDevice::Cpu;
                tracing::info!("Using NdArray device: {:?}", device);
                self.run_on::<burn::backend::NdArray>(device)
            }
            DeviceKind::Wgpu => {
                let device = burn::backend::wgpu::WgpuDevice::default();
                tracing::info!("Using WGPU device: {:?}", device);
                self.run_on::<burn::backend::Wgpu>(device)
            }
        }
    }

    fn run_on<B: Backend>(&self, device: B::Device) -> Result<RunSummary> {
        let cfg = &self.config;

        // ── Step 2: Data loader ───────────────────────────────────────────────
        let loader = DataLoader::<B>::new(cfg.data.clone(), device)
            .context("Failed to build the data loader")?;
        tracing::info!(
            "Data loader ready: objective {}, block_size {}, batch_size {}, rank {}/{}",
            cfg.data.objective,
            cfg.data.block_size,
            cfg.data.batch_size,
            cfg.data.rank,
            cfg.data.world_size
        );

        // ── Step 3: Trainer ───────────────────────────────────────────────────
        let mut trainer = Trainer::new(cfg.clone(), loader, DryRunStep::default())?;

        // ── Step 4: Resume ────────────────────────────────────────────────────
        if self.resume {
            trainer
                .resume()
                .with_context(|| format!("Cannot resume from '{}'", cfg.run.out_dir.display()))?;
        }

        // ── Step 5: Run ───────────────────────────────────────────────────────
        let summary = trainer.run()?;
        tracing::info!(
            "Run finished after {} iterations: {} tokens, epoch {}, {} batches consumed",
            summary.iters,
            summary.processed_tokens,
            summary.epoch,
            trainer.step().batches
        );
        Ok(summary)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::store::tests::write_bin;
    use tempfile::TempDir;

    #[test]
    fn test_cpu_run_then_resume() {
        let dir  = TempDir::new().unwrap();
        let file = write_bin(dir.path(), "train_0.bin", &(0..64).collect::<Vec<u16>>());

        let mut cfg = SeqtrainConfig::default();
        cfg.data.train_files   = Some(file.display().to_string());
        cfg.data.block_size    = 7;
        cfg.data.batch_size    = 2;
        cfg.run.out_dir        = dir.path().join("out");
        cfg.run.max_iters      = 3;
        cfg.run.eval_interval  = 0;

        let first = RunUseCase::new(cfg.clone(), false).execute().unwrap();
        assert_eq!(first.iters, 3);
        assert_eq!(first.processed_tokens, 3 * 2 * 7);

        cfg.run.max_iters = 5;
        let resumed = RunUseCase::new(cfg, true).execute().unwrap();
        assert_eq!(resumed.iters, 5);
        assert_eq!(resumed.processed_tokens, 5 * 2 * 7);
    }

    #[test]
    fn test_resume_without_checkpoint_fails() {
        let dir  = TempDir::new().unwrap();
        let file = write_bin(dir.path(), "train_0.bin", &[1; 32]);

        let mut cfg = SeqtrainConfig::default();
        cfg.data.train_files = Some(file.display().to_string());
        cfg.data.block_size  = 3;
        cfg.run.out_dir      = dir.path().join("out");

        assert!(RunUseCase::new(cfg, true).execute().is_err());
    }
}
