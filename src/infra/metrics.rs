// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records evaluation results to a CSV file.
//
// One row per evaluation:
//   iter,epoch,processed_tokens,train_loss,val_loss
//   200,0,819200,3.124500,3.089200
//   400,1,1638400,2.890100,
//
// A loss column is left empty when the step function does not
// report a loss (dry runs) or the split has no data.
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

const HEADER: &str = "iter,epoch,processed_tokens,train_loss,val_loss";

#[derive(Debug, Clone, PartialEq)]
pub struct EvalMetrics {
    pub iter:             usize,
    pub epoch:            usize,
    pub processed_tokens: u64,
    pub train_loss:       Option<f64>,
    pub val_loss:         Option<f64>,
}

impl EvalMetrics {
    /// True when this evaluation has a validation loss below `best`
    /// (or there is no best yet).
    pub fn is_improvement(&self, best: Option<f64>) -> bool {
        match (self.val_loss, best) {
            (Some(loss), Some(best)) => loss < best,
            (Some(_), None)          => true,
            (None, _)                => false,
        }
    }
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the header if the file doesn't exist yet, so a resumed
    /// run appends to the same log.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EvalMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)?;

        let loss = |l: Option<f64>| l.map(|v| format!("{v:.6}")).unwrap_or_default();
        writeln!(
            f,
            "{},{},{},{},{}",
            m.iter,
            m.epoch,
            m.processed_tokens,
            loss(m.train_loss),
            loss(m.val_loss),
        )?;
        Ok(())
    }
}
