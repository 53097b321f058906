// ============================================================
// Layer 4 — BatchAssembler
// ============================================================
// Implements Burn's Batcher trait to turn a Vec of materialised
// samples into device tensors. Assembly happens in two stages:
//
//   collate  Vec<MaterializedSample> → HostBatch
//            flattens every field into one contiguous Vec per
//            tensor, on the host, with no device involved
//
//   upload   HostBatch → Batch<B>
//            creates Burn tensors on the target device
//
// Splitting the stages lets the prefetch worker decide where the
// upload runs: for an accelerator it uploads in the background so
// the copy overlaps the trainer's compute; on the CPU it hands the
// host batch over and the copy happens synchronously when the
// batch is taken.
//
// Optional tensors (target_weights, attn_mask, input_pos and the
// reference log-probs) are only emitted when EVERY sample in the
// batch carries them.
//
// Shapes, for N samples of block_size S:
//   input_ids, target_ids   [N, S]    Int
//   target_weights          [N, S]    Float
//   attn_mask               [N, S, S] Bool
//   input_pos               [N, S]    Int
//   reference_*_logps       [N]       Float
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::data::materialize::{MaterializedSample, PreferenceSample, TokenSample};
use crate::domain::objective::Objective;
use crate::infra::config::DeviceKind;

// ─── Host-side batches ────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct HostTokenBatch {
    pub batch_size:     usize,
    pub seq_len:        usize,
    pub input_ids:      Vec<i32>,
    pub target_ids:     Vec<i32>,
    pub target_weights: Option<Vec<f32>>,
    pub attn_mask:      Option<Vec<bool>>,
    pub input_pos:      Option<Vec<i32>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostPreferenceBatch {
    pub batch_size:               usize,
    pub seq_len:                  usize,
    pub chosen_input_ids:         Vec<i32>,
    pub chosen_target_ids:        Vec<i32>,
    pub rejected_input_ids:       Vec<i32>,
    pub rejected_target_ids:      Vec<i32>,
    pub reference_chosen_logps:   Option<Vec<f32>>,
    pub reference_rejected_logps: Option<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostBatch {
    Tokens(HostTokenBatch),
    Preference(HostPreferenceBatch),
}

// ─── Device batches ───────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct TokenBatch<B: Backend> {
    pub input_ids:      Tensor<B, 2, Int>,
    pub target_ids:     Tensor<B, 2, Int>,
    pub target_weights: Option<Tensor<B, 2>>,
    pub attn_mask:      Option<Tensor<B, 3, Bool>>,
    pub input_pos:      Option<Tensor<B, 2, Int>>,
}

#[derive(Debug, Clone)]
pub struct PreferenceBatch<B: Backend> {
    pub chosen_input_ids:         Tensor<B, 2, Int>,
    pub chosen_target_ids:        Tensor<B, 2, Int>,
    pub rejected_input_ids:       Tensor<B, 2, Int>,
    pub rejected_target_ids:      Tensor<B, 2, Int>,
    pub reference_chosen_logps:   Option<Tensor<B, 1>>,
    pub reference_rejected_logps: Option<Tensor<B, 1>>,
}

/// A batch ready for the model forward pass.
#[derive(Debug, Clone)]
pub enum Batch<B: Backend> {
    Tokens(TokenBatch<B>),
    Preference(PreferenceBatch<B>),
}

impl<B: Backend> Batch<B> {
    /// Input token positions in the batch; preference batches count both sides.
    pub fn token_count(&self) -> usize {
        match self {
            Batch::Tokens(b) => {
                let [n, s] = b.input_ids.dims();
                n * s
            }
            Batch::Preference(b) => {
                let [n, s] = b.chosen_input_ids.dims();
                2 * n * s
            }
        }
    }
}

// ─── TransferMode ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Upload from the prefetch worker, overlapping compute
    Overlapped,
    /// Upload on the consuming thread when the batch is taken
    Synchronous,
}

impl TransferMode {
    pub fn for_device(kind: DeviceKind) -> Self {
        if kind.is_accelerator() {
            TransferMode::Overlapped
        } else {
            TransferMode::Synchronous
        }
    }
}

// ─── BatchAssembler ───────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct BatchAssembler<B: Backend> {
    device:    B::Device,
    objective: Objective,
    transfer:  TransferMode,
}

impl<B: Backend> BatchAssembler<B> {
    pub fn new(device: B::Device, objective: Objective, transfer: TransferMode) -> Self {
        Self { device, objective, transfer }
    }

    pub fn transfer(&self) -> TransferMode {
        self.transfer
    }

    /// Stack samples into flat host buffers.
    ///
    /// The objective picks the layout; a store only ever yields samples
    /// its objective accepts, so every item has the matching shape.
    pub fn collate(&self, items: Vec<MaterializedSample>) -> HostBatch {
        if self.objective.is_preference() {
            let pairs: Vec<PreferenceSample> = items
                .into_iter()
                .filter_map(|s| match s {
                    MaterializedSample::Preference(p) => Some(p),
                    MaterializedSample::Tokens(_)     => None,
                })
                .collect();
            HostBatch::Preference(collate_pairs(pairs))
        } else {
            let samples: Vec<TokenSample> = items
                .into_iter()
                .filter_map(|s| match s {
                    MaterializedSample::Tokens(t)     => Some(t),
                    MaterializedSample::Preference(_) => None,
                })
                .collect();
            HostBatch::Tokens(collate_tokens(samples))
        }
    }

    /// Create device tensors from a host batch.
    pub fn upload(&self, host: HostBatch) -> Batch<B> {
        let device = &self.device;
        match host {
            HostBatch::Tokens(h) => {
                let shape = [h.batch_size, h.seq_len];
                Batch::Tokens(TokenBatch {
                    input_ids:      ints(&h.input_ids, shape, device),
                    target_ids:     ints(&h.target_ids, shape, device),
                    target_weights: h.target_weights.map(|w| {
                        Tensor::<B, 1>::from_floats(w.as_slice(), device).reshape(shape)
                    }),
                    attn_mask: h.attn_mask.map(|m| {
                        let data = TensorData::new(m, [h.batch_size, h.seq_len, h.seq_len]);
                        Tensor::<B, 3, Bool>::from_data(data, device)
                    }),
                    input_pos: h.input_pos.map(|p| ints(&p, shape, device)),
                })
            }
            HostBatch::Preference(h) => {
                let shape = [h.batch_size, h.seq_len];
                let logps = |v: Option<Vec<f32>>| {
                    v.map(|v| Tensor::<B, 1>::from_floats(v.as_slice(), device))
                };
                Batch::Preference(PreferenceBatch {
                    chosen_input_ids:         ints(&h.chosen_input_ids, shape, device),
                    chosen_target_ids:        ints(&h.chosen_target_ids, shape, device),
                    rejected_input_ids:       ints(&h.rejected_input_ids, shape, device),
                    rejected_target_ids:      ints(&h.rejected_target_ids, shape, device),
                    reference_chosen_logps:   logps(h.reference_chosen_logps),
                    reference_rejected_logps: logps(h.reference_rejected_logps),
                })
            }
        }
    }
}

impl<B: Backend> Batcher<MaterializedSample, Batch<B>> for BatchAssembler<B> {
    fn batch(&self, items: Vec<MaterializedSample>) -> Batch<B> {
        self.upload(self.collate(items))
    }
}

fn ints<B: Backend>(values: &[i32], shape: [usize; 2], device: &B::Device) -> Tensor<B, 2, Int> {
    Tensor::<B, 1, Int>::from_ints(values, device).reshape(shape)
}

/// Concatenate a field across samples, or None unless every sample has it.
fn all_or_none<T: Clone, S>(samples: &[S], field: impl Fn(&S) -> Option<&[T]>) -> Option<Vec<T>> {
    let mut out = Vec::new();
    for s in samples {
        out.extend_from_slice(field(s)?);
    }
    Some(out)
}

fn collate_tokens(samples: Vec<TokenSample>) -> HostTokenBatch {
    let batch_size = samples.len();
    let seq_len    = samples.first().map_or(0, |s| s.input_ids.len());

    HostTokenBatch {
        batch_size,
        seq_len,
        input_ids:      samples.iter().flat_map(|s| s.input_ids.iter().copied()).collect(),
        target_ids:     samples.iter().flat_map(|s| s.target_ids.iter().copied()).collect(),
        target_weights: all_or_none(&samples, |s| s.target_weights.as_deref()),
        attn_mask:      all_or_none(&samples, |s| s.packing.as_ref().map(|p| p.attn_mask.as_slice())),
        input_pos:      all_or_none(&samples, |s| s.packing.as_ref().map(|p| p.input_pos.as_slice())),
    }
}

fn collate_pairs(pairs: Vec<PreferenceSample>) -> HostPreferenceBatch {
    let batch_size = pairs.len();
    let seq_len    = pairs.first().map_or(0, |p| p.chosen_input_ids.len());
    let flat = |field: fn(&PreferenceSample) -> &Vec<i32>| -> Vec<i32> {
        pairs.iter().flat_map(|p| field(p).iter().copied()).collect()
    };
    let logps: Option<Vec<_>> = pairs.iter().map(|p| p.reference_logps).collect();

    HostPreferenceBatch {
        batch_size,
        seq_len,
        chosen_input_ids:         flat(|p| &p.chosen_input_ids),
        chosen_target_ids:        flat(|p| &p.chosen_target_ids),
        rejected_input_ids:       flat(|p| &p.rejected_input_ids),
        rejected_target_ids:      flat(|p| &p.rejected_target_ids),
        reference_chosen_logps:   logps.as_ref().map(|l| l.iter().map(|r| r.chosen).collect()),
        reference_rejected_logps: logps.as_ref().map(|l| l.iter().map(|r| r.rejected).collect()),
    }
}
