// ============================================================
// Layer 4 — SequentialCursor
// ============================================================
// Walks the training split in file order, one offset at a time.
//
//              offset + n <= len
//            ┌───────────────────┐
//            ▼                   │
//      ┌─────────────┐    ┌──────┴──────┐
//      │ WithinFile  │───▶│  advance n  │
//      └──────┬──────┘    └─────────────┘
//             │ offset + n > len
//             ▼
//      ┌──────────────┐  unprocessed file   ┌──────────────────┐
//      │FileExhausted │────────────────────▶│ load it, offset 0│
//      └──────┬───────┘                     └──────────────────┘
//             │ none left
//             ▼
//      ┌───────────────┐                    ┌──────────────────┐
//      │EpochExhausted │───────────────────▶│ clear ledger,    │
//      └───────────────┘                    │ reload, epoch+1  │
//                                           └──────────────────┘
//
// When a batch does not fit in what is left of the file, samples
// are drawn one at a time and the rollover happens between draws,
// so one batch can hold the tail of one file and the head of the
// next file (or the next epoch).

use anyhow::Result;
use std::path::PathBuf;

use crate::data::{dataset::SplitDataset, materialize::MaterializedSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    WithinFile,
    FileExhausted,
    EpochExhausted,
}

/// What a rollover did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rollover {
    NextFile(PathBuf),
    NewEpoch(usize),
}

#[derive(Debug, Clone, Default)]
pub struct SequentialCursor {
    offset: usize,
    epoch:  usize,
}

impl SequentialCursor {
    pub fn new(offset: usize) -> Self {
        Self { offset, epoch: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    pub fn set_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
    }

    pub fn state(&self, needed: usize, dataset: &SplitDataset) -> CursorState {
        if self.offset + needed <= dataset.len() {
            CursorState::WithinFile
        } else if dataset.file_count() > 1 && dataset.has_unprocessed() {
            CursorState::FileExhausted
        } else {
            CursorState::EpochExhausted
        }
    }

    /// Move to the next file, or wrap to a new epoch when none is left.
    /// A single-file corpus keeps its loaded file and wraps immediately.
    pub fn rollover(&mut self, dataset: &mut SplitDataset) -> Result<Rollover> {
        if dataset.file_count() > 1 {
            if dataset.load_next()? {
                self.offset = 0;
                return Ok(Rollover::NextFile(dataset.current_file().to_path_buf()));
            }
            dataset.restart_epoch()?;
        }
        self.offset = 0;
        self.epoch += 1;
        tracing::info!("Epoch {} finished", self.epoch);
        Ok(Rollover::NewEpoch(self.epoch))
    }

    /// Draw the next `count` samples in order, rolling over files and
    /// epochs as needed.
    pub fn take(&mut self, dataset: &mut SplitDataset, count: usize) -> Result<Vec<MaterializedSample>> {
        if self.state(count, dataset) == CursorState::WithinFile {
            let samples = dataset.store().materialize_range(self.offset, count)?;
            self.offset += count;
            return Ok(samples);
        }

        let mut samples = Vec::with_capacity(count);
        for _ in 0..count {
            if self.offset >= dataset.len() {
                self.rollover(dataset)?;
            }
            samples.push(dataset.store().materialize(self.offset)?);
            self.offset += 1;
        }
        Ok(samples)
    }
}
