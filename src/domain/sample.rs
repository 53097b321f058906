// ============================================================
// Layer 3 — Sample Domain Types
// ============================================================
// A corpus file is normalised into a list of samples. Every
// sample is exactly one of three shapes:
//
//   Continuous      a window of block_size+1 tokens cut from a
//                   flat token stream (pretraining)
//   Instruction     a structured record with its own input/target
//                   arrays, optional loss weights and optional
//                   packed-sequence lengths
//   PreferencePair  chosen and rejected sequences, optionally with
//                   reference log-probabilities
//
// Optional fields are explicit Option<_> fields rather than
// key lookups, so a missing field is visible in the type.
//
// Token ids are i32 so that the ignore sentinel (usually -100)
// can live in the same array as real token ids.

use std::sync::Arc;

// ─── TokenWindow ──────────────────────────────────────────────────────────────
/// A read-only window onto a shared token buffer.
///
/// All continuous samples of one file share a single `Arc<[i32]>`,
/// so chunking and rank sharding never copy token data.
#[derive(Debug, Clone)]
pub struct TokenWindow {
    tokens: Arc<[i32]>,
    start:  usize,
    len:    usize,
}

impl TokenWindow {
    /// Create a window of `len` tokens starting at `start`.
    /// The caller guarantees `start + len <= tokens.len()`.
    pub fn new(tokens: Arc<[i32]>, start: usize, len: usize) -> Self {
        debug_assert!(start + len <= tokens.len());
        Self { tokens, start, len }
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.tokens[self.start..self.start + self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

impl PartialEq for TokenWindow {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

// ─── InstructionRecord ────────────────────────────────────────────────────────
/// A single-sequence structured sample.
#[derive(Debug, Clone, PartialEq)]
pub struct InstructionRecord {
    pub input_ids:      Vec<i32>,
    /// Derived from `input_ids` shifted by one when absent
    pub target_ids:     Option<Vec<i32>>,
    pub target_weights: Option<Vec<f32>>,
    /// Lengths of the sub-sequences packed into this record
    pub seq_lens:       Option<Vec<usize>>,
}

impl InstructionRecord {
    /// A record with only `input_ids`; every other field is derived later.
    pub fn from_input_ids(input_ids: Vec<i32>) -> Self {
        Self {
            input_ids,
            target_ids:     None,
            target_weights: None,
            seq_lens:       None,
        }
    }
}

// ─── PreferenceRecord ─────────────────────────────────────────────────────────
/// One side (chosen or rejected) of a preference pair.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencePair {
    pub input_ids:  Vec<i32>,
    pub target_ids: Vec<i32>,
}

/// Precomputed log-probabilities of both sides under the reference policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceLogps {
    pub chosen:   f32,
    pub rejected: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceRecord {
    pub chosen:          SequencePair,
    pub rejected:        SequencePair,
    pub reference_logps: Option<ReferenceLogps>,
}

// ─── Sample ───────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    Continuous(TokenWindow),
    Instruction(InstructionRecord),
    PreferencePair(PreferenceRecord),
}

/// The shape of a sample without its data.
/// Used to check a file against the configured objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Continuous,
    Instruction,
    PreferencePair,
}

impl std::fmt::Display for SampleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SampleKind::Continuous     => "continuous",
            SampleKind::Instruction    => "instruction",
            SampleKind::PreferencePair => "preference-pair",
        };
        f.write_str(name)
    }
}

impl Sample {
    pub fn kind(&self) -> SampleKind {
        match self {
            Sample::Continuous(_)     => SampleKind::Continuous,
            Sample::Instruction(_)    => SampleKind::Instruction,
            Sample::PreferencePair(_) => SampleKind::PreferencePair,
        }
    }

    /// Number of raw input tokens carried by this sample, before padding.
    /// Preference pairs count both sides.
    pub fn token_count(&self) -> usize {
        match self {
            Sample::Continuous(w)     => w.len(),
            Sample::Instruction(r)    => r.input_ids.len(),
            Sample::PreferencePair(p) => p.chosen.input_ids.len() + p.rejected.input_ids.len(),
        }
    }
}
