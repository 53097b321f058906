// ============================================================
// Layer 5 — ML / Training Layer
// ============================================================
// The model itself is an external collaborator: this layer only
// defines the seam it plugs into and the loop that drives it.
//
//   step.rs     — TrainStep trait
//                 train / evaluate one batch, report loss and
//                 token count. DryRunStep consumes batches
//                 without a model.
//
//   trainer.rs  — The iteration loop
//                 Batch-size ramp, periodic evaluation, dataset
//                 reloads, gradient accumulation, epoch / best /
//                 last checkpoints and resume.
//
// Reference: Burn Book §5 (Training)

/// The model-facing seam: one forward pass per batch
pub mod step;

/// Iteration loop with evaluation and checkpointing
pub mod trainer;
