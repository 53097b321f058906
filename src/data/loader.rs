// ============================================================
// Layer 4 — DataLoader
// ============================================================
// The one object the trainer talks to. It ties the pieces of
// this layer together:
//
//   train: SplitDataset ──► SequentialCursor ──┐
//                    └────► PrefetchBuffer ────┼──► BatchAssembler ──► Batch<B>
//   val:   SplitDataset ──► random indices ────┘
//
// Sequential mode (training split, sequential = true, not random):
//   1. take the prefetched batch if it was built for the current
//      (generation, offset, batch size), adopting its end offset
//   2. otherwise assemble synchronously through the cursor, which
//      also performs any file or epoch rollover
//   3. schedule the next prefetch when it fits in the loaded file
//
// Everything else draws uniformly with replacement from the loaded
// file. Validation falls back to the training split when there is
// no validation data.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

use anyhow::{Context, Result};
use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    prelude::Backend,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::data::{
    batcher::{Batch, BatchAssembler, TransferMode},
    cursor::SequentialCursor,
    dataset::SplitDataset,
    prefetch::{PrefetchBuffer, PrefetchKey},
};
use crate::domain::{error::PipelineError, split::Split, traits::Resumable};
use crate::infra::config::{BatchSizeSchedule, PipelineConfig};

// ─── DataLoaderState ──────────────────────────────────────────────────────────
/// Everything needed to put the training cursor back where it was.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataLoaderState {
    /// Files consumed this epoch; the last one is the file in progress
    pub processed_files: Vec<String>,
    pub dataset_offset:  usize,
    pub epoch:           usize,
}

// ─── BatchSizeRamp ────────────────────────────────────────────────────────────
/// Batch size as a function of the iteration number.
///
/// With a schedule the size starts at `initial` and gains one sample on
/// every iteration that is a multiple of `max_iter / 100`, including
/// iteration 0, until it reaches the configured `batch_size`. The
/// cadence is exact: `max_iter = 150` steps at 0, 3, 6, …
#[derive(Debug, Clone, Copy)]
pub struct BatchSizeRamp {
    schedule: Option<BatchSizeSchedule>,
    target:   usize,
    current:  usize,
}

impl BatchSizeRamp {
    pub fn new(schedule: Option<BatchSizeSchedule>, target: usize) -> Self {
        let current = schedule.map_or(target, |s| s.initial);
        Self { schedule, target, current }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn update(&mut self, iter: usize) -> usize {
        if let Some(s) = self.schedule {
            let interval = ramp_interval(s.max_iter);
            self.current = (s.initial + iter / interval + 1).min(self.target);
        }
        self.current
    }
}

/// Smallest whole iteration count `k` with `k % (max_iter / 100) == 0`.
fn ramp_interval(max_iter: usize) -> usize {
    if max_iter == 0 {
        return 1;
    }
    let (mut a, mut b) = (max_iter, 100);
    while b != 0 {
        (a, b) = (b, a % b);
    }
    max_iter / a
}

// ─── DataLoader ───────────────────────────────────────────────────────────────
pub struct DataLoader<B: Backend> {
    cfg:       PipelineConfig,
    train:     SplitDataset,
    val:       Option<SplitDataset>,
    cursor:    SequentialCursor,
    prefetch:  PrefetchBuffer<B>,
    assembler: BatchAssembler<B>,
    ramp:      BatchSizeRamp,
    rng:       StdRng,
}

impl<B: Backend> DataLoader<B> {
    pub fn new(cfg: PipelineConfig, device: B::Device) -> Result<Self> {
        cfg.validate()?;

        let train = SplitDataset::open(&cfg, Split::Train)?.ok_or_else(|| PipelineError::NoTrainingFiles {
            location: "the training split".to_string(),
        })?;
        let val = SplitDataset::open(&cfg, Split::Validation)?;

        for (split, ds) in [(Split::Train, Some(&train)), (Split::Validation, val.as_ref())] {
            let Some(ds) = ds else { continue };
            let names: Vec<String> = ds.files().iter().map(|p| p.display().to_string()).collect();
            tracing::info!("{} files ({}): {}", split, names.len(), names.join(", "));
            tracing::info!(
                "{} samples loaded from {} for rank {}/{}",
                ds.len(),
                ds.current_file().display(),
                cfg.rank,
                cfg.world_size
            );
        }

        let start_offset = cfg.start_offset.unwrap_or(0);
        if start_offset > 0 {
            tracing::info!("Starting sequential traversal at offset {}", start_offset);
        }

        let transfer  = TransferMode::for_device(cfg.device);
        let assembler = BatchAssembler::new(device, cfg.objective, transfer);
        let ramp      = BatchSizeRamp::new(cfg.batch_size_schedule, cfg.batch_size);
        let rng       = StdRng::seed_from_u64(cfg.seed + cfg.rank as u64);

        Ok(Self {
            cursor: SequentialCursor::new(start_offset),
            prefetch: PrefetchBuffer::new(),
            train,
            val,
            assembler,
            ramp,
            rng,
            cfg,
        })
    }

    /// Next batch for `split`.
    pub fn get_batch(&mut self, split: Split, random: bool) -> Result<Batch<B>> {
        if split.is_train() && !random && self.cfg.sequential {
            self.sequential_batch()
        } else {
            self.random_batch(split)
        }
    }

    fn sequential_batch(&mut self) -> Result<Batch<B>> {
        let batch_size = self.ramp.current();
        let key = PrefetchKey {
            generation: self.train.generation(),
            offset:     self.cursor.offset(),
            batch_size,
        };

        let batch = match self.prefetch.take(key)? {
            Some(ready) => {
                self.cursor.set_offset(ready.next_offset);
                ready.batch.into_batch(&self.assembler)
            }
            None => {
                let samples = self.cursor.take(&mut self.train, batch_size)?;
                self.assembler.batch(samples)
            }
        };

        let next = self.cursor.offset();
        if self.cfg.prefetch && next + batch_size <= self.train.len() {
            let key = PrefetchKey { generation: self.train.generation(), offset: next, batch_size };
            self.prefetch
                .spawn(self.train.store().clone(), key, self.assembler.clone())?;
        }
        Ok(batch)
    }

    fn random_batch(&mut self, split: Split) -> Result<Batch<B>> {
        let ds = match split {
            Split::Train      => &self.train,
            Split::Validation => self.val.as_ref().unwrap_or(&self.train),
        };
        let store = ds.store();
        let len   = store.len();

        let samples = (0..self.ramp.current())
            .map(|_| store.materialize(self.rng.gen_range(0..len)))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Random {} batch from {}", split, store.path().display()))?;
        Ok(self.assembler.batch(samples))
    }

    /// Advance the batch-size ramp to `iter` and return the size in effect.
    pub fn update_batch_size(&mut self, iter: usize) -> usize {
        let before = self.ramp.current();
        let after  = self.ramp.update(iter);
        if after != before {
            tracing::debug!("Batch size {} → {} at iter {}", before, after, iter);
        }
        after
    }

    pub fn batch_size(&self) -> usize {
        self.ramp.current()
    }

    pub fn epoch(&self) -> usize {
        self.cursor.epoch()
    }

    pub fn available_splits(&self) -> Vec<Split> {
        match self.val {
            Some(_) => vec![Split::Train, Split::Validation],
            None    => vec![Split::Train],
        }
    }

    /// Rebuild the loaded files from disk. The ledger and offset are kept.
    pub fn reload_datasets(&mut self) -> Result<()> {
        self.prefetch.discard();
        self.train.reload().context("Reloading training split")?;
        if let Some(val) = self.val.as_mut() {
            val.reload().context("Reloading validation split")?;
        }
        tracing::info!("Datasets reloaded; resuming at offset {}", self.cursor.offset());
        Ok(())
    }

    #[cfg(test)]
    pub fn current_file(&self) -> PathBuf {
        self.train.current_file().to_path_buf()
    }
}

impl<B: Backend> Resumable for DataLoader<B> {
    type State = DataLoaderState;

    fn snapshot(&self) -> DataLoaderState {
        DataLoaderState {
            processed_files: self
                .train
                .processed_files()
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            dataset_offset: self.cursor.offset(),
            epoch:          self.cursor.epoch(),
        }
    }

    fn restore(&mut self, state: DataLoaderState) -> Result<()> {
        self.prefetch.discard();
        let files = state.processed_files.iter().map(PathBuf::from).collect();
        self.train.restore_ledger(files).context("Restoring processed-files ledger")?;
        self.cursor.set_offset(state.dataset_offset);
        self.cursor.set_epoch(state.epoch);
        tracing::info!(
            "Resumed at {} offset {} (epoch {})",
            self.train.current_file().display(),
            state.dataset_offset,
            state.epoch
        );
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::store::tests::write_bin;
    use burn::backend::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    /// Two files of 6 and 4 samples; block_size 1 makes each sample two
    /// tokens whose first token identifies it.
    fn corpus(dir: &TempDir) -> PipelineConfig {
        let a: Vec<u16> = (0..6).flat_map(|i| [i, i]).collect();
        let b: Vec<u16> = (100..104).flat_map(|i| [i, i]).collect();
        let files = [write_bin(dir.path(), "a.bin", &a), write_bin(dir.path(), "b.bin", &b)];
        PipelineConfig {
            train_files: Some(files.map(|p| p.display().to_string()).join(",")),
            block_size:  1,
            batch_size:  4,
            ..Default::default()
        }
    }

    fn loader(cfg: PipelineConfig) -> DataLoader<TestBackend> {
        DataLoader::new(cfg, Default::default()).unwrap()
    }

    fn ids(batch: Batch<TestBackend>) -> Vec<i64> {
        match batch {
            Batch::Tokens(b) => {
                let [n, s] = b.input_ids.dims();
                let flat: Vec<i64> = b.input_ids.into_data().iter::<i64>().collect();
                (0..n).map(|row| flat[row * s]).collect()
            }
            _ => panic!("expected a token batch"),
        }
    }

    fn drain(dl: &mut DataLoader<TestBackend>, steps: usize) -> Vec<Vec<i64>> {
        (0..steps).map(|_| ids(dl.get_batch(Split::Train, false).unwrap())).collect()
    }

    #[test]
    fn test_sequential_batches_cross_files_and_epochs() {
        let dir = TempDir::new().unwrap();
        let mut dl = loader(corpus(&dir));

        let batches = drain(&mut dl, 3);
        assert_eq!(batches[0], vec![0, 1, 2, 3]);
        assert_eq!(batches[1], vec![4, 5, 100, 101]);
        assert_eq!(batches[2], vec![102, 103, 0, 1]);
        assert_eq!(dl.epoch(), 1);
    }

    #[test]
    fn test_prefetch_does_not_change_the_sequence() {
        let dir = TempDir::new().unwrap();
        let with    = drain(&mut loader(corpus(&dir)), 8);
        let without = drain(&mut loader(PipelineConfig { prefetch: false, ..corpus(&dir) }), 8);
        assert_eq!(with, without);
    }

    #[test]
    fn test_resume_continues_where_snapshot_was_taken() {
        let dir = TempDir::new().unwrap();
        let cfg = PipelineConfig { batch_size: 2, ..corpus(&dir) };

        let mut original = loader(cfg.clone());
        drain(&mut original, 4); // a.bin done, one batch into b.bin
        let state = original.snapshot();
        assert_eq!(state.dataset_offset, 2);
        assert_eq!(state.processed_files.len(), 2);
        let expected = drain(&mut original, 3);

        let mut resumed = loader(cfg);
        resumed.restore(state.clone()).unwrap();
        assert!(resumed.current_file().ends_with("b.bin"));
        assert_eq!(resumed.snapshot(), state);
        assert_eq!(drain(&mut resumed, 3), expected);
    }

    #[test]
    fn test_restoring_empty_state_keeps_position() {
        let dir = TempDir::new().unwrap();
        let mut dl = loader(corpus(&dir));
        dl.restore(DataLoaderState::default()).unwrap();
        assert!(dl.current_file().ends_with("a.bin"));
        assert_eq!(drain(&mut dl, 1)[0], vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_start_offset_and_processed_files_count() {
        let dir = TempDir::new().unwrap();
        let cfg = PipelineConfig { start_offset: Some(3), batch_size: 2, ..corpus(&dir) };
        assert_eq!(drain(&mut loader(cfg.clone()), 1)[0], vec![3, 4]);

        let cfg = PipelineConfig { processed_files_count: 1, start_offset: None, ..cfg };
        assert_eq!(drain(&mut loader(cfg), 1)[0], vec![100, 101]);
    }

    #[test]
    fn test_batch_size_ramp() {
        let mut ramp = BatchSizeRamp::new(Some(BatchSizeSchedule { initial: 2, max_iter: 300 }), 5);
        assert_eq!(ramp.current(), 2);
        // interval = 3
        let sizes: Vec<usize> = (0..12).map(|i| ramp.update(i)).collect();
        assert_eq!(sizes, vec![3, 3, 3, 4, 4, 4, 5, 5, 5, 5, 5, 5]);

        let mut fixed = BatchSizeRamp::new(None, 8);
        assert_eq!(fixed.update(0), 8);
        assert_eq!(fixed.update(1000), 8);

        // A tiny max_iter still ramps every iteration
        let mut fast = BatchSizeRamp::new(Some(BatchSizeSchedule { initial: 1, max_iter: 10 }), 3);
        assert_eq!((0..3).map(|i| fast.update(i)).collect::<Vec<_>>(), vec![2, 3, 3]);
    }

    #[test]
    fn test_ramp_interval_follows_fractional_cadence() {
        assert_eq!(ramp_interval(0), 1);
        assert_eq!(ramp_interval(100), 1);
        assert_eq!(ramp_interval(150), 3);
        assert_eq!(ramp_interval(250), 5);
        assert_eq!(ramp_interval(1000), 10);

        // 1.5 iterations per step: grows at 0, 3, 6
        let mut ramp = BatchSizeRamp::new(Some(BatchSizeSchedule { initial: 1, max_iter: 150 }), 10);
        let sizes: Vec<usize> = (0..8).map(|i| ramp.update(i)).collect();
        assert_eq!(sizes, vec![2, 2, 2, 3, 3, 3, 4, 4]);

        // 2.5 iterations per step: grows at 0, 5, 10
        let mut ramp = BatchSizeRamp::new(Some(BatchSizeSchedule { initial: 1, max_iter: 250 }), 10);
        let sizes: Vec<usize> = (0..11).map(|i| ramp.update(i)).collect();
        assert_eq!(sizes, vec![2, 2, 2, 2, 2, 3, 3, 3, 3, 3, 4]);
    }

    #[test]
    fn test_ramped_batches_have_ramped_size() {
        let dir = TempDir::new().unwrap();
        let cfg = PipelineConfig {
            batch_size_schedule: Some(BatchSizeSchedule { initial: 1, max_iter: 100 }),
            ..corpus(&dir)
        };
        let mut dl = loader(cfg);
        assert_eq!(dl.update_batch_size(0), 2);
        assert_eq!(ids(dl.get_batch(Split::Train, false).unwrap()), vec![0, 1]);
        assert_eq!(dl.update_batch_size(1), 3);
        // The prefetch built for two samples is discarded
        assert_eq!(ids(dl.get_batch(Split::Train, false).unwrap()), vec![2, 3, 4]);
    }

    #[test]
    fn test_random_batches_and_validation_fallback() {
        let dir = TempDir::new().unwrap();
        let mut dl = loader(corpus(&dir));
        assert_eq!(dl.available_splits(), vec![Split::Train]);

        let batch = ids(dl.get_batch(Split::Validation, true).unwrap());
        assert_eq!(batch.len(), 4);
        assert!(batch.iter().all(|id| (0..6).contains(id)));

        // Random draws do not move the sequential cursor
        assert_eq!(dl.snapshot().dataset_offset, 0);
    }

    #[test]
    fn test_random_draws_are_seeded() {
        let dir = TempDir::new().unwrap();
        let cfg = PipelineConfig { sequential: false, ..corpus(&dir) };
        let a = drain(&mut loader(cfg.clone()), 3);
        let b = drain(&mut loader(cfg.clone()), 3);
        assert_eq!(a, b);

        let other_rank = drain(&mut loader(PipelineConfig { seed: cfg.seed + 1, ..cfg }), 3);
        assert_ne!(a, other_rank);
    }

    #[test]
    fn test_reload_keeps_offset() {
        let dir = TempDir::new().unwrap();
        let cfg = PipelineConfig { batch_size: 2, ..corpus(&dir) };
        let mut reference = loader(cfg.clone());
        let expected = drain(&mut reference, 3);

        let mut dl = loader(cfg);
        let mut got = drain(&mut dl, 1);
        dl.reload_datasets().unwrap();
        got.extend(drain(&mut dl, 2));
        assert_eq!(got, expected);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        let cfg = PipelineConfig { rank: 1, ..corpus(&dir) };
        let err = DataLoader::<TestBackend>::new(cfg, Default::default()).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::InvalidConfig { .. })
        ));
    }
}
