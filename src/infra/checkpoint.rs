// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores trainer progress as JSON.
//
// What gets saved per checkpoint:
//   1. iter_num, processed_tokens, best_val_loss
//   2. the full run config, for auditing a resumed run
//   3. the data loader's resumable state, stored opaquely: the
//      trainer never looks inside it
//
// File naming convention:
//   out/
//     epoch_1.json    ← written when the loader finishes epoch 1
//     best.json       ← lowest validation loss so far
//     last.json       ← periodic and final
//     latest.json     ← name of the checkpoint written most recently
//
// Reference: serde_json documentation
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

use crate::infra::config::SeqtrainConfig;

const LATEST: &str = "latest.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerCheckpoint {
    pub iter_num:         usize,
    pub processed_tokens: u64,
    pub best_val_loss:    Option<f64>,
    pub config:           SeqtrainConfig,
    /// Loader state captured before the batch in hand was fetched
    pub dataloader:       serde_json::Value,
}

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a manager writing into `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Write `{name}.json` and point latest.json at it.
    pub fn save(&self, name: &str, ckpt: &TrainerCheckpoint) -> Result<()> {
        let path = self.path(name);
        let json = serde_json::to_string_pretty(ckpt)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        let latest = self.dir.join(LATEST);
        fs::write(&latest, serde_json::to_string(name)?)
            .with_context(|| format!("Failed to write '{}'", latest.display()))?;

        tracing::info!("Saved checkpoint '{}' at iter {}", name, ckpt.iter_num);
        Ok(())
    }

    pub fn load(&self, name: &str) -> Result<TrainerCheckpoint> {
        let path = self.path(name);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read checkpoint '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Cannot parse checkpoint '{}'", path.display()))
    }

    /// Load whichever checkpoint latest.json names.
    pub fn load_latest(&self) -> Result<TrainerCheckpoint> {
        let latest = self.dir.join(LATEST);
        let raw = fs::read_to_string(&latest).with_context(|| {
            format!("Cannot find '{}'. Has a run saved a checkpoint yet?", latest.display())
        })?;
        let name: String = serde_json::from_str(&raw)?;
        self.load(&name)
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ckpt(iter_num: usize) -> TrainerCheckpoint {
        TrainerCheckpoint {
            iter_num,
            processed_tokens: 4096,
            best_val_loss:    Some(2.5),
            config:           SeqtrainConfig::default(),
            dataloader:       serde_json::json!({ "dataset_offset": 7 }),
        }
    }

    #[test]
    fn test_round_trip_and_latest_pointer() {
        let dir = TempDir::new().unwrap();
        let mgr = CheckpointManager::new(dir.path().join("out")).unwrap();

        mgr.save("best", &ckpt(10)).unwrap();
        mgr.save("last", &ckpt(20)).unwrap();

        let best = mgr.load("best").unwrap();
        assert_eq!(best.iter_num, 10);
        assert_eq!(best.best_val_loss, Some(2.5));
        assert_eq!(best.dataloader["dataset_offset"], 7);

        assert_eq!(mgr.load_latest().unwrap().iter_num, 20);
    }

    #[test]
    fn test_missing_latest_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mgr = CheckpointManager::new(dir.path()).unwrap();
        assert!(mgr.load_latest().is_err());
    }
}
