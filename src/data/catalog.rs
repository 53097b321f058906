// ============================================================
// Layer 4 — FileCatalog
// ============================================================
// Resolves the configured dataset location into the ordered list
// of corpus files for one split.
//
// Two ways to name files:
//   1. An explicit comma-separated list (train_files /
//      validation_files). Every entry must have a registered
//      suffix; anything else is rejected here, before loading.
//   2. A directory scan of data_dir/dataset, keeping files whose
//      name starts with the split's prefix and whose suffix is
//      registered. Other files are ignored.
//
// Either way the result is sorted lexicographically and
// deduplicated, so every rank walks the files in the same order.
//
// An empty training split is fatal. An empty validation split
// simply means the run has no validation data.
//
// Reference: Rust Book §12 (Reading files), std::fs::read_dir

use anyhow::{Context, Result};
use std::{fs, path::PathBuf};

use crate::data::format::CorpusFormat;
use crate::domain::{error::PipelineError, split::Split};
use crate::infra::config::PipelineConfig;

#[derive(Debug, Clone)]
pub struct FileCatalog {
    files: Vec<PathBuf>,
}

impl FileCatalog {
    pub fn resolve(cfg: &PipelineConfig, split: Split) -> Result<FileCatalog> {
        let explicit = match split {
            Split::Train      => cfg.train_files.as_deref(),
            Split::Validation => cfg.validation_files.as_deref(),
        }
        .filter(|list| !list.trim().is_empty());

        let (mut files, location) = match (explicit, cfg.dataset.as_deref()) {
            (Some(list), _) => (explicit_files(list)?, "explicit file list".to_string()),
            (None, Some(dataset)) => {
                let dir = cfg.data_dir.join(dataset);
                let prefix = match split {
                    Split::Train      => cfg.train_file_prefix.as_str(),
                    Split::Validation => cfg.validation_file_prefix.as_str(),
                };
                let found = scan_dir(&dir, prefix)?;
                tracing::info!("Found {} files in {} with prefix '{}'", found.len(), dir.display(), prefix);
                (found, dir.display().to_string())
            }
            (None, None) => (Vec::new(), "an unset dataset location".to_string()),
        };

        files.sort();
        files.dedup();

        if files.is_empty() {
            if split.is_train() {
                return Err(PipelineError::NoTrainingFiles { location }.into());
            }
            tracing::info!("No {} files found; validation will use the training split", split);
        }

        Ok(FileCatalog { files })
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn explicit_files(list: &str) -> Result<Vec<PathBuf>> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let path = PathBuf::from(entry);
            if CorpusFormat::is_supported(&path) {
                Ok(path)
            } else {
                Err(PipelineError::UnsupportedFormat { path }.into())
            }
        })
        .collect()
}

fn scan_dir(dir: &std::path::Path, prefix: &str) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        tracing::warn!("Dataset directory '{}' does not exist", dir.display());
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Cannot read directory '{}'", dir.display()))?
    {
        let path = entry?.path();
        let name_matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(prefix));
        if path.is_file() && name_matches && CorpusFormat::is_supported(&path) {
            files.push(path);
        }
    }
    Ok(files)
}
