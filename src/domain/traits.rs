// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// Components whose position in a long-running job must survive a
// restart implement Resumable. The trainer never looks inside the
// state: it serialises whatever `snapshot()` returns into its own
// checkpoint and hands it back verbatim through `restore()`.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};

// ─── Resumable ────────────────────────────────────────────────────────────────
/// Any component that can report and re-enter its progress.
///
/// Implementations:
///   - DataLoader → processed-files ledger, dataset offset, epoch
pub trait Resumable {
    /// Serialisable progress marker
    type State: Serialize + DeserializeOwned + Clone;

    /// Capture the current progress.
    fn snapshot(&self) -> Self::State;

    /// Return to a previously captured progress marker.
    fn restore(&mut self, state: Self::State) -> Result<()>;
}
