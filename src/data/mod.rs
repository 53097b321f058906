// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from corpus files on disk all the
// way to device-ready tensor batches.
//
// The pipeline flows in this order:
//
//   dataset dir / file list
//       │
//       ▼
//   FileCatalog       → sorted, deduplicated files per split
//       │
//       ▼
//   format            → suffix registry: .bin / .safetensors / .alm / .jsonl
//       │
//       ▼
//   SampleStore       → one file, aligned and sharded for this rank
//       │
//       ▼
//   SplitDataset      → which file is loaded, processed-files ledger
//       │
//       ▼
//   SequentialCursor  → offset + epoch, file and epoch rollover
//       │
//       ▼
//   PrefetchBuffer    → next batch built on a worker thread
//       │
//       ▼
//   BatchAssembler    → stacks samples into tensor batches
//       │
//       ▼
//   DataLoader        → feeds batches to the training loop
//
// Reference: Burn Book §4 (Datasets and Dataloaders)
//            Rust Book §13 (Iterators and Closures)

/// Resolves dataset locations into ordered file lists
pub mod catalog;

/// Suffix → parser registry for the supported corpus formats
pub mod format;

/// Cyclic padding, windowing and rank sharding
pub mod alignment;

/// Turns raw samples into fixed-length arrays
pub mod materialize;

/// One loaded corpus file; implements Burn's Dataset trait
pub mod store;

/// Per-split file state and processed-files ledger
pub mod dataset;

/// Sequential traversal across files and epochs
pub mod cursor;

/// Single-slot background batch assembly
pub mod prefetch;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Trainer-facing batch source with checkpoint/resume
pub mod loader;
