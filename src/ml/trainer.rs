// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Iteration driver around the DataLoader and a TrainStep.
//
// One iteration:
//   epoch checkpoint   when the loader's epoch moved forward
//   batch-size ramp    update_batch_size(iter)
//   evaluation         every eval_interval: eval_iters random
//                      batches per split, metrics row, `best`
//                      checkpoint on improvement
//   reload             every reload_interval
//   micro-steps        grad_accum × (train on the batch in hand,
//                      then fetch the next one)
//   logging            every log_interval
//   `last` checkpoint  every checkpoint_interval and at the end
//
// The batch for the next micro-step is always fetched before the
// current iteration ends, so there is a batch "in hand" at every
// checkpoint. The loader state written to a checkpoint is the one
// captured just before that batch was fetched: on resume the
// loader fetches the same batch again and nothing is skipped or
// trained twice.
//
// Reference: Burn Book §5 (Training)

use anyhow::{Context, Result};
use burn::prelude::Backend;

use crate::data::{
    batcher::Batch,
    loader::{DataLoader, DataLoaderState},
};
use crate::domain::{split::Split, traits::Resumable};
use crate::infra::{
    checkpoint::{CheckpointManager, TrainerCheckpoint},
    config::SeqtrainConfig,
    metrics::{EvalMetrics, MetricsLogger},
};
use crate::ml::step::TrainStep;

/// Totals reported when a run finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub iters:            usize,
    pub processed_tokens: u64,
    pub epoch:            usize,
    pub best_val_loss:    Option<f64>,
}

pub struct Trainer<B: Backend, S: TrainStep<B>> {
    config:           SeqtrainConfig,
    loader:           DataLoader<B>,
    step:             S,
    checkpoints:      CheckpointManager,
    metrics:          MetricsLogger,
    iter_num:         usize,
    processed_tokens: u64,
    best_val_loss:    Option<f64>,
}

fn due(interval: usize, iter: usize) -> bool {
    interval > 0 && iter % interval == 0
}

impl<B: Backend, S: TrainStep<B>> Trainer<B, S> {
    pub fn new(config: SeqtrainConfig, loader: DataLoader<B>, step: S) -> Result<Self> {
        let checkpoints = CheckpointManager::new(&config.run.out_dir)?;
        let metrics     = MetricsLogger::new(&config.run.out_dir)?;
        Ok(Self {
            config,
            loader,
            step,
            checkpoints,
            metrics,
            iter_num:         0,
            processed_tokens: 0,
            best_val_loss:    None,
        })
    }

    /// Pick up from the checkpoint named by latest.json.
    pub fn resume(&mut self) -> Result<()> {
        let ckpt = self.checkpoints.load_latest()?;
        let state: DataLoaderState = serde_json::from_value(ckpt.dataloader)
            .context("Checkpoint holds no valid data loader state")?;
        self.loader.restore(state)?;

        self.iter_num         = ckpt.iter_num;
        self.processed_tokens = ckpt.processed_tokens;
        self.best_val_loss    = ckpt.best_val_loss;
        tracing::info!(
            "Resuming from iter {} ({} tokens processed)",
            self.iter_num,
            self.processed_tokens
        );
        Ok(())
    }

    pub fn step(&self) -> &S {
        &self.step
    }

    pub fn run(&mut self) -> Result<RunSummary> {
        let run = self.config.run.clone();
        let grad_accum = run.grad_accum.max(1);

        // The batch in hand for iteration k is fetched at the size of k-1
        self.loader.update_batch_size(self.iter_num.saturating_sub(1));
        let mut state_before = self.loader.snapshot();
        let mut batch        = self.loader.get_batch(Split::Train, false)?;
        let mut last_epoch   = self.loader.epoch();

        while self.iter_num < run.max_iters {
            let iter = self.iter_num;

            // ── Epoch checkpoint ──────────────────────────────────────────────
            let epoch = self.loader.epoch();
            if epoch > last_epoch {
                self.save(&format!("epoch_{epoch}"), &state_before)?;
                last_epoch = epoch;
            }

            self.loader.update_batch_size(iter);

            // ── Evaluation ────────────────────────────────────────────────────
            if due(run.eval_interval, iter) {
                let m = self.evaluate(run.eval_iters)?;
                tracing::info!(
                    "iter {}: train loss {:?}, val loss {:?}",
                    iter,
                    m.train_loss,
                    m.val_loss
                );
                self.metrics.log(&m)?;
                if m.is_improvement(self.best_val_loss) {
                    self.best_val_loss = m.val_loss;
                    self.save("best", &state_before)?;
                }
            }

            if iter > 0 && due(run.reload_interval, iter) {
                self.loader.reload_datasets()?;
            }

            // ── Micro-steps ───────────────────────────────────────────────────
            let mut loss_sum = 0.0;
            let mut losses   = 0usize;
            for _ in 0..grad_accum {
                let out = self
                    .step
                    .train(&batch)
                    .with_context(|| format!("Train step failed at iter {iter}"))?;
                self.processed_tokens += out.tokens as u64;
                if let Some(loss) = out.loss {
                    loss_sum += loss;
                    losses   += 1;
                }

                state_before = self.loader.snapshot();
                batch        = self.loader.get_batch(Split::Train, false)?;
            }
            self.iter_num += 1;

            if due(run.log_interval, iter) {
                let loss = (losses > 0).then(|| loss_sum / losses as f64);
                tracing::info!(
                    "iter {}: loss {:?}, batch size {}, tokens {}, epoch {}",
                    iter,
                    loss,
                    self.loader.batch_size(),
                    self.processed_tokens,
                    self.loader.epoch()
                );
            }

            if due(run.checkpoint_interval, self.iter_num) {
                self.save("last", &state_before)?;
            }
        }

        self.save("last", &state_before)?;
        Ok(RunSummary {
            iters:            self.iter_num,
            processed_tokens: self.processed_tokens,
            epoch:            self.loader.epoch(),
            best_val_loss:    self.best_val_loss,
        })
    }

    /// Mean loss over `eval_iters` random batches of each available split.
    fn evaluate(&mut self, eval_iters: usize) -> Result<EvalMetrics> {
        let mut m = EvalMetrics {
            iter:             self.iter_num,
            epoch:            self.loader.epoch(),
            processed_tokens: self.processed_tokens,
            train_loss:       None,
            val_loss:         None,
        };

        for split in self.loader.available_splits() {
            let mut losses = Vec::with_capacity(eval_iters);
            for _ in 0..eval_iters {
                let batch: Batch<B> = self.loader.get_batch(split, true)?;
                if let Some(loss) = self.step.evaluate(&batch)?.loss {
                    losses.push(loss);
                }
            }
            let mean = (!losses.is_empty()).then(|| losses.iter().sum::<f64>() / losses.len() as f64);
            match split {
                Split::Train      => m.train_loss = mean,
                Split::Validation => m.val_loss = mean,
            }
        }
        Ok(m)
    }

    fn save(&self, name: &str, state: &DataLoaderState) -> Result<()> {
        let ckpt = TrainerCheckpoint {
            iter_num:         self.iter_num,
            processed_tokens: self.processed_tokens,
            best_val_loss:    self.best_val_loss,
            config:           self.config.clone(),
            dataloader:       serde_json::to_value(state)?,
        };
        self.checkpoints.save(name, &ckpt)
    }
}
