// ============================================================
// Layer 4 — Corpus Format Registry
// ============================================================
// Maps a file suffix to the parser that understands it. The
// catalog consults the registry when it builds the file list, so
// an unknown suffix is rejected up front and never reaches a
// parser.
//
//   suffix        family          payload
//   ───────────   ─────────────   ─────────────────────────────────
//   .bin          token stream    flat little-endian u16 tokens
//   .safetensors  tensor blob     1-D token tensor, or 2-D [N, L]
//                                 token rows
//   .alm/.jsonl   records         one JSON object per line
//
// Parsers return a RawCorpus: either one flat token stream (to be
// padded and chunked into windows) or a list of ready-made
// samples (padded at sample granularity).
//
// Reference: memmap2, safetensors and serde_json crate docs

use anyhow::{Context, Result};
use memmap2::Mmap;
use safetensors::{tensor::TensorView, Dtype, SafeTensors};
use serde::Deserialize;
use std::{
    fs::{self, File},
    io::{BufRead, BufReader},
    path::Path,
};

use crate::domain::{
    error::PipelineError,
    objective::Objective,
    sample::{InstructionRecord, PreferenceRecord, ReferenceLogps, Sample, SequencePair},
};

// ─── CorpusFormat ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpusFormat {
    TokenStream,
    TensorBlob,
    Records,
}

/// What a parser hands back before alignment and sharding.
#[derive(Debug)]
pub enum RawCorpus {
    Tokens(Vec<i32>),
    Records(Vec<Sample>),
}

type ParseFn = fn(&Path) -> Result<RawCorpus>;

const REGISTRY: &[(&str, CorpusFormat, ParseFn)] = &[
    ("bin",         CorpusFormat::TokenStream, read_token_stream),
    ("safetensors", CorpusFormat::TensorBlob,  read_tensor_blob),
    ("alm",         CorpusFormat::Records,     read_records),
    ("jsonl",       CorpusFormat::Records,     read_records),
];

impl CorpusFormat {
    /// Look up the format for a path by its extension.
    pub fn from_path(path: &Path) -> Option<CorpusFormat> {
        registry_entry(path).map(|(_, format, _)| format)
    }

    pub fn is_supported(path: &Path) -> bool {
        registry_entry(path).is_some()
    }

    pub fn name(self) -> &'static str {
        match self {
            CorpusFormat::TokenStream => "raw token stream",
            CorpusFormat::TensorBlob  => "tensor blob",
            CorpusFormat::Records     => "structured record",
        }
    }

    /// Format-level objective rules. Record files are checked per sample
    /// once they are parsed.
    pub fn check_objective(self, path: &Path, objective: Objective) -> Result<(), PipelineError> {
        let allowed = match self {
            CorpusFormat::TokenStream => objective == Objective::Pretrain,
            CorpusFormat::TensorBlob  => !objective.is_preference(),
            CorpusFormat::Records     => true,
        };
        if allowed {
            Ok(())
        } else {
            Err(PipelineError::FormatObjectiveMismatch {
                path:   path.to_path_buf(),
                format: self.name(),
                objective,
            })
        }
    }
}

fn registry_entry(path: &Path) -> Option<(&'static str, CorpusFormat, ParseFn)> {
    let ext = path.extension()?.to_str()?;
    REGISTRY.iter().copied().find(|(suffix, _, _)| *suffix == ext)
}

/// Parse a corpus file with the parser registered for its suffix.
pub fn parse(path: &Path) -> Result<(CorpusFormat, RawCorpus)> {
    let (_, format, parser) = registry_entry(path)
        .ok_or_else(|| PipelineError::UnsupportedFormat { path: path.to_path_buf() })?;
    let corpus = parser(path)?;
    Ok((format, corpus))
}

// ─── Token stream (.bin) ──────────────────────────────────────────────────────
fn read_token_stream(path: &Path) -> Result<RawCorpus> {
    let file = File::open(path)
        .with_context(|| format!("Cannot open '{}'", path.display()))?;
    let byte_len = file.metadata()?.len() as usize;

    if byte_len % 2 != 0 {
        return Err(PipelineError::malformed(
            path,
            format!("byte length {byte_len} is not a multiple of 2 (expected u16 tokens)"),
        )
        .into());
    }
    if byte_len == 0 {
        return Ok(RawCorpus::Tokens(Vec::new()));
    }

    // SAFETY: the map is read-only and dropped before this function returns;
    // tokens are copied out into an owned buffer.
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("Cannot memory-map '{}'", path.display()))?;

    let tokens = mmap
        .chunks_exact(2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]) as i32)
        .collect();
    Ok(RawCorpus::Tokens(tokens))
}

// ─── Tensor blob (.safetensors) ───────────────────────────────────────────────
fn read_tensor_blob(path: &Path) -> Result<RawCorpus> {
    let bytes = fs::read(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    let tensors = SafeTensors::deserialize(&bytes)
        .map_err(|e| PipelineError::malformed(path, format!("{e:?}")))?;

    // A tensor named "tokens", or the only tensor in the file
    let view = match tensors.tensor("tokens") {
        Ok(view) => view,
        Err(_) => {
            let names = tensors.names();
            if names.len() != 1 {
                return Err(PipelineError::malformed(
                    path,
                    format!("expected a 'tokens' tensor or exactly one tensor, found {}", names.len()),
                )
                .into());
            }
            tensors
                .tensor(names[0])
                .map_err(|e| PipelineError::malformed(path, format!("{e:?}")))?
        }
    };

    let ids = decode_ids(&view, path)?;
    match view.shape() {
        [_] => Ok(RawCorpus::Tokens(ids)),
        [rows, cols] => {
            let (rows, cols) = (*rows, *cols);
            if cols == 0 {
                return Err(PipelineError::malformed(path, "token rows have zero length").into());
            }
            let records = ids
                .chunks_exact(cols)
                .take(rows)
                .map(|row| Sample::Instruction(InstructionRecord::from_input_ids(row.to_vec())))
                .collect();
            Ok(RawCorpus::Records(records))
        }
        shape => Err(PipelineError::malformed(
            path,
            format!("expected a 1-D or 2-D token tensor, found shape {shape:?}"),
        )
        .into()),
    }
}

fn decode_ids(view: &TensorView<'_>, path: &Path) -> Result<Vec<i32>> {
    let data = view.data();
    let out_of_range = |v: i64| PipelineError::malformed(path, format!("token id {v} does not fit in i32"));

    let ids = match view.dtype() {
        Dtype::U16 => data
            .chunks_exact(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]) as i32)
            .collect(),
        Dtype::I32 => data
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
        Dtype::U32 => data
            .chunks_exact(4)
            .map(|b| {
                let v = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                i32::try_from(v).map_err(|_| out_of_range(v as i64))
            })
            .collect::<Result<Vec<_>, _>>()?,
        Dtype::I64 => data
            .chunks_exact(8)
            .map(|b| {
                let v = i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
                i32::try_from(v).map_err(|_| out_of_range(v))
            })
            .collect::<Result<Vec<_>, _>>()?,
        other => {
            return Err(PipelineError::malformed(path, format!("unsupported token dtype {other:?}")).into())
        }
    };
    Ok(ids)
}

// ─── Structured records (.alm / .jsonl) ───────────────────────────────────────
/// One line of a record file. Every field is optional here; which
/// ones are required depends on whether the line is a preference pair.
#[derive(Debug, Deserialize)]
struct RecordLine {
    input_ids:                Option<Vec<i32>>,
    target_ids:               Option<Vec<i32>>,
    target_weights:           Option<Vec<f32>>,
    seq_lens:                 Option<Vec<usize>>,
    chosen_input_ids:         Option<Vec<i32>>,
    chosen_target_ids:        Option<Vec<i32>>,
    rejected_input_ids:       Option<Vec<i32>>,
    rejected_target_ids:      Option<Vec<i32>>,
    reference_chosen_logps:   Option<f32>,
    reference_rejected_logps: Option<f32>,
}

impl RecordLine {
    fn is_preference(&self) -> bool {
        self.chosen_input_ids.is_some()
            || self.chosen_target_ids.is_some()
            || self.rejected_input_ids.is_some()
            || self.rejected_target_ids.is_some()
    }

    fn into_sample(self, path: &Path, index: usize) -> Result<Sample, PipelineError> {
        let missing = |field| PipelineError::MissingField { path: path.to_path_buf(), index, field };

        if self.is_preference() {
            let reference_logps = match (self.reference_chosen_logps, self.reference_rejected_logps) {
                (Some(chosen), Some(rejected)) => Some(ReferenceLogps { chosen, rejected }),
                _ => None,
            };
            return Ok(Sample::PreferencePair(PreferenceRecord {
                chosen: SequencePair {
                    input_ids:  self.chosen_input_ids.ok_or_else(|| missing("chosen_input_ids"))?,
                    target_ids: self.chosen_target_ids.ok_or_else(|| missing("chosen_target_ids"))?,
                },
                rejected: SequencePair {
                    input_ids:  self.rejected_input_ids.ok_or_else(|| missing("rejected_input_ids"))?,
                    target_ids: self.rejected_target_ids.ok_or_else(|| missing("rejected_target_ids"))?,
                },
                reference_logps,
            }));
        }

        Ok(Sample::Instruction(InstructionRecord {
            input_ids:      self.input_ids.ok_or_else(|| missing("input_ids"))?,
            target_ids:     self.target_ids,
            target_weights: self.target_weights,
            seq_lens:       self.seq_lens,
        }))
    }
}

fn read_records(path: &Path) -> Result<RawCorpus> {
    let file = File::open(path)
        .with_context(|| format!("Cannot open '{}'", path.display()))?;

    let mut samples = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Cannot read '{}'", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: RecordLine = serde_json::from_str(&line).map_err(|e| {
            PipelineError::malformed(path, format!("line {}: {e}", line_no + 1))
        })?;
        let index = samples.len();
        samples.push(record.into_sample(path, index)?);
    }
    Ok(RawCorpus::Records(samples))
}
