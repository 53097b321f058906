// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Handles all cross-cutting concerns that don't belong in
// any specific business layer:
//
//   config.rs      — Run configuration
//                    JSON file with data and run sections,
//                    every field defaulted, validated before
//                    the pipeline starts.
//
//   checkpoint.rs  — Trainer checkpoints
//                    JSON files holding iteration counters, the
//                    config and the data loader's resumable
//                    state, plus a latest.json pointer.
//
//   metrics.rs     — Evaluation metrics logging
//                    Appends one CSV row per evaluation.
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)

/// Pipeline and run configuration
pub mod config;

/// Trainer checkpoint saving and loading
pub mod checkpoint;

/// Evaluation metrics CSV logger
pub mod metrics;
