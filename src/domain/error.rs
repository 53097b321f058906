// ============================================================
// Layer 3 — Pipeline Errors
// ============================================================
// Typed failures raised by the data pipeline. They travel inside
// anyhow::Error once they leave the data layer, so callers that
// care about a specific failure use `err.downcast_ref::<PipelineError>()`.
//
// A corpus file that is merely too small is NOT an error: it is
// skipped with a warning and the next file is tried.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::{objective::Objective, sample::SampleKind};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("training dataset files not found in {location}")]
    NoTrainingFiles { location: String },

    #[error("unsupported corpus file extension: {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("{format} files cannot feed the {objective} objective: {}", path.display())]
    FormatObjectiveMismatch {
        path:      PathBuf,
        format:    &'static str,
        objective: Objective,
    },

    #[error("{} contains {kind} samples, which the {objective} objective does not accept", path.display())]
    SampleObjectiveMismatch {
        path:      PathBuf,
        kind:      SampleKind,
        objective: Objective,
    },

    #[error("record {index} in {} is missing required field '{field}'", path.display())]
    MissingField {
        path:  PathBuf,
        index: usize,
        field: &'static str,
    },

    #[error("malformed corpus file {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("invalid sample: {reason}")]
    InvalidSample { reason: String },

    #[error("epoch reload found no usable corpus file among {files} candidates")]
    CorpusExhausted { files: usize },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl PipelineError {
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PipelineError::Malformed { path: path.into(), reason: reason.into() }
    }

    pub fn invalid_sample(reason: impl Into<String>) -> Self {
        PipelineError::InvalidSample { reason: reason.into() }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        PipelineError::InvalidConfig { reason: reason.into() }
    }
}
