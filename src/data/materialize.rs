// ============================================================
// Layer 4 — Sample Materialisation
// ============================================================
// Converts a raw Sample into fixed-length arrays, one sample at a
// time and only when the sample is actually requested.
//
// Continuous window (block_size+1 tokens):
//   input  = window[..block_size]
//   target = window[1..]
//
// Instruction record:
//   - target_ids missing → derived from input_ids shifted by one
//   - weighted loss on   → target_weights taken from the record, or
//                          1.0 where target != ignore_index, else 0.0
//   - every field truncated to block_size, then padded:
//       input_ids      with pad_token_id
//       target_ids     with ignore_index
//       target_weights with 0.0
//   - seq_lens present   → packed-sequence attention mask and
//                          per-sequence positions
//
// Preference pair:
//   four sequences padded independently, never merged with the
//   single-sequence path.
//
// Packed-sequence layout for seq_lens=[3,2], block_size=8:
//
//        0 1 2 3 4 5 6 7
//     0  1 . . . . . . .        input_pos = 0 1 2 0 1 2 3 4
//     1  1 1 . . . . . .                    ───── ─── ─────
//     2  1 1 1 . . . . .                    seq 0 seq1 pad
//     3  . . . 1 . . . .
//     4  . . . 1 1 . . .
//     5  . . . . . 1 . .        pad rows attend only to themselves
//     6  . . . . . . 1 .
//     7  . . . . . . . 1

use crate::domain::{
    error::PipelineError,
    sample::{InstructionRecord, PreferenceRecord, ReferenceLogps, Sample, SequencePair, TokenWindow},
};
use crate::infra::config::PipelineConfig;

// ─── Materialised shapes ──────────────────────────────────────────────────────
/// Block-diagonal causal mask (row-major, block_size²) and positions.
#[derive(Debug, Clone, PartialEq)]
pub struct Packing {
    pub attn_mask: Vec<bool>,
    pub input_pos: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenSample {
    pub input_ids:      Vec<i32>,
    pub target_ids:     Vec<i32>,
    pub target_weights: Option<Vec<f32>>,
    pub packing:        Option<Packing>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceSample {
    pub chosen_input_ids:    Vec<i32>,
    pub chosen_target_ids:   Vec<i32>,
    pub rejected_input_ids:  Vec<i32>,
    pub rejected_target_ids: Vec<i32>,
    pub reference_logps:     Option<ReferenceLogps>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MaterializedSample {
    Tokens(TokenSample),
    Preference(PreferenceSample),
}

// ─── Materializer ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct Materializer {
    block_size:    usize,
    pad_token_id:  Option<i32>,
    ignore_index:  i32,
    weighted_loss: bool,
}

impl Materializer {
    pub fn new(block_size: usize, pad_token_id: Option<i32>, ignore_index: i32, weighted_loss: bool) -> Self {
        Self { block_size, pad_token_id, ignore_index, weighted_loss }
    }

    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self::new(cfg.block_size, cfg.pad_token_id, cfg.ignore_index, cfg.weighted_loss)
    }

    pub fn materialize(&self, sample: &Sample) -> Result<MaterializedSample, PipelineError> {
        match sample {
            Sample::Continuous(window)   => Ok(MaterializedSample::Tokens(self.continuous(window))),
            Sample::Instruction(record)  => self.instruction(record).map(MaterializedSample::Tokens),
            Sample::PreferencePair(pair) => self.preference(pair).map(MaterializedSample::Preference),
        }
    }

    fn continuous(&self, window: &TokenWindow) -> TokenSample {
        let tokens = window.as_slice();
        let n      = tokens.len();
        TokenSample {
            input_ids:      tokens[..n.saturating_sub(1)].to_vec(),
            target_ids:     tokens[n.min(1)..].to_vec(),
            target_weights: None,
            packing:        None,
        }
    }

    fn instruction(&self, record: &InstructionRecord) -> Result<TokenSample, PipelineError> {
        let (mut input, target) = match &record.target_ids {
            Some(target) => (record.input_ids.clone(), target.clone()),
            None => {
                let ids = &record.input_ids;
                if ids.len() < 2 {
                    return Err(PipelineError::invalid_sample(format!(
                        "cannot derive target_ids from {} input token(s)",
                        ids.len()
                    )));
                }
                (ids[..ids.len() - 1].to_vec(), ids[1..].to_vec())
            }
        };

        if let Some(pad) = self.pad_token_id {
            for t in input.iter_mut().filter(|t| **t == self.ignore_index) {
                *t = pad;
            }
        }

        let weights = if self.weighted_loss {
            let w = match &record.target_weights {
                Some(w) if w.len() != target.len() => {
                    return Err(PipelineError::invalid_sample(format!(
                        "target_weights has {} entries but target_ids has {}",
                        w.len(),
                        target.len()
                    )));
                }
                Some(w) => w.clone(),
                None => target
                    .iter()
                    .map(|&t| if t == self.ignore_index { 0.0 } else { 1.0 })
                    .collect(),
            };
            Some(self.fit(w, 0.0, "target_weights")?)
        } else {
            None
        };

        let input_ids  = self.fit(input, self.pad_token_id.unwrap_or_default(), "input_ids")?;
        let target_ids = self.fit(target, self.ignore_index, "target_ids")?;

        let packing = match &record.seq_lens {
            Some(lens) => Some(packing(lens, self.block_size)?),
            None       => None,
        };

        Ok(TokenSample { input_ids, target_ids, target_weights: weights, packing })
    }

    fn preference(&self, pair: &PreferenceRecord) -> Result<PreferenceSample, PipelineError> {
        let side = |seq: &SequencePair, name: &str| -> Result<(Vec<i32>, Vec<i32>), PipelineError> {
            Ok((
                self.fit(seq.input_ids.clone(), self.pad_token_id.unwrap_or_default(), name)?,
                self.fit(seq.target_ids.clone(), self.ignore_index, name)?,
            ))
        };
        let (chosen_input_ids, chosen_target_ids)     = side(&pair.chosen, "chosen")?;
        let (rejected_input_ids, rejected_target_ids) = side(&pair.rejected, "rejected")?;

        Ok(PreferenceSample {
            chosen_input_ids,
            chosen_target_ids,
            rejected_input_ids,
            rejected_target_ids,
            reference_logps: pair.reference_logps,
        })
    }

    /// Truncate to block_size, then pad with `fill`.
    /// Padding requires a configured pad token.
    fn fit<T: Copy>(&self, mut values: Vec<T>, fill: T, field: &str) -> Result<Vec<T>, PipelineError> {
        values.truncate(self.block_size);
        if values.len() < self.block_size {
            if self.pad_token_id.is_none() {
                return Err(PipelineError::invalid_sample(format!(
                    "{field} has {} entries, block_size is {} and no pad_token_id is configured",
                    values.len(),
                    self.block_size
                )));
            }
            values.resize(self.block_size, fill);
        }
        Ok(values)
    }
}

/// Build the block-diagonal causal mask and restart-per-sequence positions
/// for `seq_lens` packed into a slot of `len` tokens.
pub fn packing(seq_lens: &[usize], len: usize) -> Result<Packing, PipelineError> {
    let total: usize = seq_lens.iter().sum();
    if total == 0 || total > len {
        return Err(PipelineError::invalid_sample(format!(
            "seq_lens sum to {total}, expected 1..={len}"
        )));
    }

    let mut attn_mask = vec![false; len * len];
    let mut input_pos = Vec::with_capacity(len);

    let mut start = 0;
    for &n in seq_lens {
        for i in 0..n {
            for j in 0..=i {
                attn_mask[(start + i) * len + start + j] = true;
            }
            input_pos.push(i as i32);
        }
        start += n;
    }

    let mut next = input_pos.last().map_or(0, |p| p + 1);
    for k in start..len {
        attn_mask[k * len + k] = true;
        input_pos.push(next);
        next += 1;
    }

    Ok(Packing { attn_mask, input_pos })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const IGNORE: i32 = -100;
    const PAD:    i32 = 0;

    fn record(input: Vec<i32>, target: Option<Vec<i32>>) -> Sample {
        Sample::Instruction(InstructionRecord {
            input_ids:      input,
            target_ids:     target,
            target_weights: None,
            seq_lens:       None,
        })
    }

    fn tokens(m: MaterializedSample) -> TokenSample {
        match m {
            MaterializedSample::Tokens(t) => t,
            other => panic!("expected tokens, got {other:?}"),
        }
    }

    #[test]
    fn test_continuous_window_shifts_by_one() {
        let m = Materializer::new(4, None, IGNORE, false);
        let w = TokenWindow::new(Arc::from(vec![1, 2, 3, 4, 5]), 0, 5);
        let t = tokens(m.materialize(&Sample::Continuous(w)).unwrap());
        assert_eq!(t.input_ids,  vec![1, 2, 3, 4]);
        assert_eq!(t.target_ids, vec![2, 3, 4, 5]);
        assert!(t.target_weights.is_none());
    }

    #[test]
    fn test_short_record_padding_and_derived_weights() {
        let m = Materializer::new(6, Some(PAD), IGNORE, true);
        let s = record(vec![5, 6, 7, 8], Some(vec![IGNORE, 7, 8, 9]));
        let t = tokens(m.materialize(&s).unwrap());

        assert_eq!(t.input_ids,  vec![5, 6, 7, 8, PAD, PAD]);
        assert_eq!(t.target_ids, vec![IGNORE, 7, 8, 9, IGNORE, IGNORE]);

        let weights = t.target_weights.unwrap();
        for (w, target) in weights.iter().zip(&t.target_ids) {
            let expected = if *target == IGNORE { 0.0 } else { 1.0 };
            assert_eq!(*w, expected);
        }
    }

    #[test]
    fn test_missing_targets_are_derived() {
        let m = Materializer::new(4, Some(PAD), IGNORE, false);
        let t = tokens(m.materialize(&record(vec![1, 2, 3], None)).unwrap());
        assert_eq!(t.input_ids,  vec![1, 2, PAD, PAD]);
        assert_eq!(t.target_ids, vec![2, 3, IGNORE, IGNORE]);
    }

    #[test]
    fn test_ignore_sentinel_in_inputs_becomes_pad() {
        // Token rows arrive padded with the ignore sentinel
        let m = Materializer::new(4, Some(PAD), IGNORE, true);
        let t = tokens(m.materialize(&record(vec![1, 2, IGNORE, IGNORE], None)).unwrap());
        assert_eq!(t.input_ids,  vec![1, 2, PAD, PAD]);
        assert_eq!(t.target_ids, vec![2, IGNORE, IGNORE, IGNORE]);
        assert_eq!(t.target_weights, Some(vec![1.0, 0.0, 0.0, 0.0]));
    }

    #[test]
    fn test_long_record_is_truncated() {
        let m = Materializer::new(3, None, IGNORE, false);
        let t = tokens(m.materialize(&record(vec![1, 2, 3, 4, 5], Some(vec![2, 3, 4, 5, 6]))).unwrap());
        assert_eq!(t.input_ids,  vec![1, 2, 3]);
        assert_eq!(t.target_ids, vec![2, 3, 4]);
    }

    #[test]
    fn test_short_record_without_pad_token_is_rejected() {
        let m = Materializer::new(8, None, IGNORE, false);
        let err = m.materialize(&record(vec![1, 2, 3], Some(vec![2, 3, 4]))).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidSample { .. }));
    }

    #[test]
    fn test_weights_dropped_when_weighted_loss_is_off() {
        let m = Materializer::new(2, None, IGNORE, false);
        let s = Sample::Instruction(InstructionRecord {
            input_ids:      vec![1, 2],
            target_ids:     Some(vec![2, 3]),
            target_weights: Some(vec![0.5, 0.5]),
            seq_lens:       None,
        });
        assert!(tokens(m.materialize(&s).unwrap()).target_weights.is_none());
    }

    #[test]
    fn test_mismatched_weights_are_rejected() {
        let m = Materializer::new(2, None, IGNORE, true);
        let s = Sample::Instruction(InstructionRecord {
            input_ids:      vec![1, 2],
            target_ids:     Some(vec![2, 3]),
            target_weights: Some(vec![1.0]),
            seq_lens:       None,
        });
        assert!(m.materialize(&s).is_err());
    }

    #[test]
    fn test_packed_mask_and_positions() {
        let p = packing(&[3, 2], 8).unwrap();
        assert_eq!(p.input_pos, vec![0, 1, 2, 0, 1, 2, 3, 4]);

        let allowed = |i: usize, j: usize| -> bool {
            match (i, j) {
                (0..=2, 0..=2) => j <= i, // first sequence, causal
                (3..=4, 3..=4) => j <= i, // second sequence, causal
                (5..=7, _)     => i == j, // pad region, identity
                _              => false,
            }
        };
        for i in 0..8 {
            for j in 0..8 {
                assert_eq!(p.attn_mask[i * 8 + j], allowed(i, j), "mask[{i}][{j}]");
            }
        }
    }

    #[test]
    fn test_packing_rejects_overflow() {
        assert!(packing(&[5, 5], 8).is_err());
        assert!(packing(&[], 8).is_err());
    }

    #[test]
    fn test_preference_sides_padded_independently() {
        let m = Materializer::new(4, Some(PAD), IGNORE, false);
        let s = Sample::PreferencePair(PreferenceRecord {
            chosen:          SequencePair { input_ids: vec![1, 2, 3], target_ids: vec![2, 3, 4] },
            rejected:        SequencePair { input_ids: vec![9],       target_ids: vec![8] },
            reference_logps: Some(ReferenceLogps { chosen: -1.0, rejected: -2.0 }),
        });
        match m.materialize(&s).unwrap() {
            MaterializedSample::Preference(p) => {
                assert_eq!(p.chosen_input_ids,    vec![1, 2, 3, PAD]);
                assert_eq!(p.chosen_target_ids,   vec![2, 3, 4, IGNORE]);
                assert_eq!(p.rejected_input_ids,  vec![9, PAD, PAD, PAD]);
                assert_eq!(p.rejected_target_ids, vec![8, IGNORE, IGNORE, IGNORE]);
                assert_eq!(p.reference_logps.map(|r| r.rejected), Some(-2.0));
            }
            other => panic!("expected a preference sample, got {other:?}"),
        }
    }
}
