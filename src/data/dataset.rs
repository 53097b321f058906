// ============================================================
// Layer 4 — SplitDataset
// ============================================================
// Owns everything about one split that changes as training moves
// through the corpus:
//
//   catalog          the ordered file list (fixed)
//   processed files  the ledger of files consumed this epoch
//   store            the one file currently held in memory
//   generation       bumped every time `store` is replaced, so a
//                    prefetch built from an older store can be
//                    recognised and thrown away
//
// Loading the next file walks the catalog in order and picks the
// first file not yet in the ledger. Files are ledgered before
// they are parsed, so a file skipped for being too small stays
// skipped for the rest of the epoch.

use anyhow::Result;
use burn::data::dataset::Dataset;
use std::{path::{Path, PathBuf}, sync::Arc};

use crate::data::{catalog::FileCatalog, store::SampleStore};
use crate::domain::{error::PipelineError, split::Split};
use crate::infra::config::PipelineConfig;

pub struct SplitDataset {
    cfg:        PipelineConfig,
    catalog:    FileCatalog,
    processed:  Vec<PathBuf>,
    store:      Arc<SampleStore>,
    generation: u64,
}

impl SplitDataset {
    /// Resolve the split's files and load the first usable one.
    ///
    /// Returns `Ok(None)` for a validation split with no files or no
    /// usable file. A training split in that situation is an error.
    pub fn open(cfg: &PipelineConfig, split: Split) -> Result<Option<SplitDataset>> {
        let catalog = FileCatalog::resolve(cfg, split)?;
        if catalog.is_empty() {
            return Ok(None);
        }

        let mut processed = Vec::new();
        if split.is_train() && cfg.processed_files_count > 0 {
            processed.extend(catalog.files().iter().take(cfg.processed_files_count).cloned());
            tracing::info!("Marked {} training files as already processed", processed.len());
        }

        match next_unprocessed(&catalog, cfg, &mut processed)? {
            Some(store) => Ok(Some(SplitDataset {
                cfg: cfg.clone(),
                catalog,
                processed,
                store,
                generation: 0,
            })),
            None if split.is_train() => Err(PipelineError::CorpusExhausted { files: catalog.len() }.into()),
            None => {
                tracing::warn!("No usable {} file among {} candidates", split, catalog.len());
                Ok(None)
            }
        }
    }

    /// Replace the loaded file with the next unprocessed one.
    /// Returns false, leaving the current file loaded, when none is left.
    pub fn load_next(&mut self) -> Result<bool> {
        match next_unprocessed(&self.catalog, &self.cfg, &mut self.processed)? {
            Some(store) => {
                self.store = store;
                self.generation += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Clear the ledger and load the first usable file again.
    pub fn restart_epoch(&mut self) -> Result<()> {
        self.processed.clear();
        if self.load_next()? {
            Ok(())
        } else {
            Err(PipelineError::CorpusExhausted { files: self.catalog.len() }.into())
        }
    }

    /// Adopt a persisted ledger. Its last entry was in progress when the
    /// ledger was saved, so it is removed and that file is loaded again.
    pub fn restore_ledger(&mut self, mut files: Vec<PathBuf>) -> Result<()> {
        if files.pop().is_none() {
            return Ok(());
        }
        self.processed = files;
        if !self.load_next()? {
            tracing::warn!("Restored ledger leaves no usable file; starting the file list over");
            self.restart_epoch()?;
        }
        Ok(())
    }

    /// Rebuild the current file from disk, keeping the ledger.
    pub fn reload(&mut self) -> Result<()> {
        let mut files = self.processed.clone();
        files.push(self.store.path().to_path_buf());
        // The current file is the ledger's last entry; popping it and
        // loading the next unprocessed file reloads the same file.
        files.dedup();
        self.restore_ledger(files)
    }

    /// True when some catalog file is not yet in the ledger.
    pub fn has_unprocessed(&self) -> bool {
        self.catalog.files().iter().any(|f| !self.processed.contains(f))
    }

    pub fn store(&self) -> &Arc<SampleStore> {
        &self.store
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn current_file(&self) -> &Path {
        self.store.path()
    }

    pub fn processed_files(&self) -> &[PathBuf] {
        &self.processed
    }

    pub fn files(&self) -> &[PathBuf] {
        self.catalog.files()
    }

    pub fn file_count(&self) -> usize {
        self.catalog.len()
    }
}

fn next_unprocessed(
    catalog:   &FileCatalog,
    cfg:       &PipelineConfig,
    processed: &mut Vec<PathBuf>,
) -> Result<Option<Arc<SampleStore>>> {
    for path in catalog.files() {
        if processed.contains(path) {
            continue;
        }
        processed.push(path.clone());
        if let Some(store) = SampleStore::load(path, cfg)? {
            tracing::info!(
                "New dataset file {} loaded ({} samples). Processed files: {}",
                path.display(),
                store.len(),
                processed.len()
            );
            return Ok(Some(Arc::new(store)));
        }
    }
    Ok(None)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::store::tests::write_bin;
    use tempfile::TempDir;

    fn corpus(dir: &TempDir, files: &[(&str, usize)]) -> PipelineConfig {
        let names: Vec<String> = files
            .iter()
            .map(|(name, tokens)| {
                let data: Vec<u16> = (0..*tokens as u16).collect();
                write_bin(dir.path(), name, &data).display().to_string()
            })
            .collect();
        PipelineConfig {
            train_files: Some(names.join(",")),
            block_size:  3,
            ..Default::default()
        }
    }

    #[test]
    fn test_small_files_are_skipped_and_ledgered() {
        let dir = TempDir::new().unwrap();
        // block_size 3 → 4 tokens needed; b.bin is too small
        let cfg = corpus(&dir, &[("a.bin", 8), ("b.bin", 2), ("c.bin", 8)]);
        let mut ds = SplitDataset::open(&cfg, Split::Train).unwrap().unwrap();
        assert!(ds.current_file().ends_with("a.bin"));

        assert!(ds.load_next().unwrap());
        assert!(ds.current_file().ends_with("c.bin"));
        assert_eq!(ds.processed_files().len(), 3);
        assert!(!ds.has_unprocessed());
        assert!(!ds.load_next().unwrap());
        assert_eq!(ds.generation(), 1);
    }

    #[test]
    fn test_restart_epoch_starts_over() {
        let dir = TempDir::new().unwrap();
        let cfg = corpus(&dir, &[("a.bin", 8), ("b.bin", 8)]);
        let mut ds = SplitDataset::open(&cfg, Split::Train).unwrap().unwrap();
        ds.load_next().unwrap();
        ds.restart_epoch().unwrap();
        assert!(ds.current_file().ends_with("a.bin"));
        assert_eq!(ds.processed_files().len(), 1);
    }

    #[test]
    fn test_processed_files_count_skips_leading_files() {
        let dir = TempDir::new().unwrap();
        let mut cfg = corpus(&dir, &[("a.bin", 8), ("b.bin", 8), ("c.bin", 8)]);
        cfg.processed_files_count = 2;
        let ds = SplitDataset::open(&cfg, Split::Train).unwrap().unwrap();
        assert!(ds.current_file().ends_with("c.bin"));
    }

    #[test]
    fn test_restore_ledger_reloads_last_entry() {
        let dir = TempDir::new().unwrap();
        let cfg = corpus(&dir, &[("a.bin", 8), ("b.bin", 8), ("c.bin", 8)]);
        let mut ds = SplitDataset::open(&cfg, Split::Train).unwrap().unwrap();

        let ledger = ds.files()[..2].to_vec();
        ds.restore_ledger(ledger.clone()).unwrap();
        assert!(ds.current_file().ends_with("b.bin"));
        assert_eq!(ds.processed_files(), ledger.as_slice());
    }

    #[test]
    fn test_reload_keeps_current_file() {
        let dir = TempDir::new().unwrap();
        let cfg = corpus(&dir, &[("a.bin", 8), ("b.bin", 8)]);
        let mut ds = SplitDataset::open(&cfg, Split::Train).unwrap().unwrap();
        ds.load_next().unwrap();
        let before = ds.generation();

        ds.reload().unwrap();
        assert!(ds.current_file().ends_with("b.bin"));
        assert_eq!(ds.processed_files().len(), 2);
        assert!(ds.generation() > before);
    }

    #[test]
    fn test_training_split_of_only_small_files_is_exhausted() {
        let dir = TempDir::new().unwrap();
        let cfg = corpus(&dir, &[("a.bin", 2), ("b.bin", 3)]);
        let err = SplitDataset::open(&cfg, Split::Train).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::CorpusExhausted { files: 2 })
        ));
    }

    #[test]
    fn test_epoch_restart_with_every_file_shrunk_is_fatal() {
        let dir = TempDir::new().unwrap();
        let cfg = corpus(&dir, &[("a.bin", 8), ("b.bin", 8)]);
        let mut ds = SplitDataset::open(&cfg, Split::Train).unwrap().unwrap();
        ds.load_next().unwrap();

        // Both files truncated below the 4-token minimum on disk
        write_bin(dir.path(), "a.bin", &[1, 2]);
        write_bin(dir.path(), "b.bin", &[1]);

        let err = ds.restart_epoch().err().unwrap();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::CorpusExhausted { files: 2 })
        ));
    }

    #[test]
    fn test_unusable_validation_split_is_none() {
        let dir = TempDir::new().unwrap();
        let mut cfg = corpus(&dir, &[("a.bin", 8)]);
        let tiny = write_bin(dir.path(), "v.bin", &[1]);
        cfg.validation_files = Some(tiny.display().to_string());
        assert!(SplitDataset::open(&cfg, Split::Validation).unwrap().is_none());
    }
}
