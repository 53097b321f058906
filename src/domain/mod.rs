// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types that describe what flows through the pipeline:
// samples as they come off disk, the splits a corpus is divided
// into, the training objectives a corpus can feed, and the typed
// failures the pipeline reports.
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O
//   - Only structs, enums and traits
//
// Reference: Rust Book §5 (Structs), §6 (Enums), §10 (Traits)

/// Raw samples: continuous token windows, instruction records, preference pairs
pub mod sample;

/// Train / validation split identifiers
pub mod split;

/// Training objectives and which sample kinds they accept
pub mod objective;

/// Typed pipeline failures
pub mod error;

/// Core abstractions (traits) that other layers implement
pub mod traits;
