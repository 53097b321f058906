// ============================================================
// Layer 5 — Train Step
// ============================================================
// The seam between the data pipeline and the model. The trainer
// owns iteration, evaluation and checkpoint bookkeeping; whatever
// implements TrainStep owns the forward pass, the loss and the
// optimiser update.

use anyhow::Result;
use burn::prelude::Backend;

use crate::data::batcher::Batch;

/// What one forward pass reports back.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StepOutput {
    pub loss:   Option<f64>,
    pub tokens: usize,
}

pub trait TrainStep<B: Backend> {
    /// Forward, backward and update on one micro-batch.
    fn train(&mut self, batch: &Batch<B>) -> Result<StepOutput>;

    /// Forward only.
    fn evaluate(&mut self, batch: &Batch<B>) -> Result<StepOutput>;
}

/// Consumes batches without a model. Drives the pipeline end to end
/// for throughput checks and for exercising checkpoint/resume.
#[derive(Debug, Default)]
pub struct DryRunStep {
    pub batches: usize,
}

impl<B: Backend> TrainStep<B> for DryRunStep {
    fn train(&mut self, batch: &Batch<B>) -> Result<StepOutput> {
        self.batches += 1;
        Ok(StepOutput { loss: None, tokens: batch.token_count() })
    }

    fn evaluate(&mut self, batch: &Batch<B>) -> Result<StepOutput> {
        Ok(StepOutput { loss: None, tokens: batch.token_count() })
    }
}
