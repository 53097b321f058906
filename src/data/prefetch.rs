// ============================================================
// Layer 4 — PrefetchBuffer
// ============================================================
// Holds at most one batch that is being built ahead of time.
//
//   spawn(key)              take(key)
//   ──────────              ─────────
//   worker thread:          same key      → wait, hand over
//     materialise           different key → drop, None
//     collate               nothing pending → None
//     upload (Overlapped)
//     send ──► channel(1) ──►
//
// A key is (store generation, start offset, batch size). The
// worker only reads an Arc of the store, so replacing the loaded
// file never invalidates a running worker; the key is what tells
// a consumer the result was built for a position that is no
// longer current (new file, restored offset, ramped batch size).
//
// Dropping the buffer drops the receiver. A worker still running
// at that point finishes, fails to send and exits on its own.

use anyhow::{anyhow, Context, Result};
use burn::prelude::Backend;
use std::{
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
};

use crate::data::{
    batcher::{Batch, BatchAssembler, HostBatch, TransferMode},
    store::SampleStore,
};

/// Where a prefetched batch currently lives.
pub enum Staged<B: Backend> {
    Host(HostBatch),
    Device(Batch<B>),
}

impl<B: Backend> Staged<B> {
    pub fn into_batch(self, assembler: &BatchAssembler<B>) -> Batch<B> {
        match self {
            Staged::Host(host)    => assembler.upload(host),
            Staged::Device(batch) => batch,
        }
    }
}

/// Identifies the batch a prefetch was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchKey {
    pub generation: u64,
    pub offset:     usize,
    pub batch_size: usize,
}

pub struct Prefetched<B: Backend> {
    pub batch:       Staged<B>,
    /// Cursor position after this batch
    pub next_offset: usize,
}

struct Pending<B: Backend> {
    key:      PrefetchKey,
    receiver: mpsc::Receiver<Result<Staged<B>>>,
    worker:   JoinHandle<()>,
}

pub struct PrefetchBuffer<B: Backend> {
    pending: Option<Pending<B>>,
}

impl<B: Backend> Default for PrefetchBuffer<B> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<B: Backend> PrefetchBuffer<B> {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Start building the batch described by `key` in the background.
    /// Any batch still pending is discarded first.
    pub fn spawn(&mut self, store: Arc<SampleStore>, key: PrefetchKey, assembler: BatchAssembler<B>) -> Result<()> {
        self.discard();

        let (sender, receiver) = mpsc::sync_channel(1);
        let worker = thread::Builder::new()
            .name("prefetch".to_string())
            .spawn(move || {
                let staged = store.materialize_range(key.offset, key.batch_size).map(|samples| {
                    let host = assembler.collate(samples);
                    match assembler.transfer() {
                        TransferMode::Overlapped  => Staged::Device(assembler.upload(host)),
                        TransferMode::Synchronous => Staged::Host(host),
                    }
                });
                // The receiver is gone when the batch was discarded
                let _ = sender.send(staged);
            })
            .context("Failed to spawn prefetch worker")?;

        tracing::debug!(
            "Prefetching {} samples at offset {} (generation {})",
            key.batch_size,
            key.offset,
            key.generation
        );
        self.pending = Some(Pending { key, receiver, worker });
        Ok(())
    }

    /// Wait for the pending batch if it was built for `key`.
    pub fn take(&mut self, key: PrefetchKey) -> Result<Option<Prefetched<B>>> {
        let Some(pending) = self.pending.take() else {
            return Ok(None);
        };
        if pending.key != key {
            tracing::debug!("Discarding prefetch built for {:?}, wanted {:?}", pending.key, key);
            return Ok(None);
        }

        let staged = pending.receiver.recv().map_err(|_| {
            let reason = match pending.worker.join() {
                Err(_) => "panicked",
                Ok(()) => "exited without sending",
            };
            anyhow!("Prefetch worker {reason} at offset {}", key.offset)
        })??;

        Ok(Some(Prefetched { batch: staged, next_offset: key.offset + key.batch_size }))
    }

    /// Drop the pending batch, if any, without waiting for it.
    pub fn discard(&mut self) {
        if let Some(pending) = self.pending.take() {
            tracing::debug!("Discarding prefetch at offset {}", pending.key.offset);
        }
    }
}
