// ============================================================
// Layer 6: Metrics Logger
// ============================================================
// Appends one CSV row per epoch:
//
//   epoch,train_loss,val_loss,mlm_accuracy,nsp_accuracy,learning_rate
//   1,7.412300,7.289100,0.041000,0.512000,0.000090
//   2,6.980400,6.901200,0.067000,0.548000,0.000045
//
// nsp_accuracy is left empty when the run has no next-sentence
// labels. Re-running into the same directory appends rows
// rather than overwriting earlier runs.
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

const HEADER: &str = "epoch,train_loss,val_loss,mlm_accuracy,nsp_accuracy,learning_rate";

/// One row of metrics for a single epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,

    /// Mean weighted pretraining loss over training batches
    pub train_loss: f64,

    /// Mean weighted pretraining loss on the validation set
    pub val_loss: f64,

    /// Fraction of masked tokens predicted exactly
    pub mlm_accuracy: f64,

    /// Fraction of next-sentence labels predicted correctly
    pub nsp_accuracy: Option<f64>,

    /// Learning rate at the last step of the epoch
    pub learning_rate: f64,
}

impl EpochMetrics {
    pub fn new(
        epoch:         usize,
        train_loss:    f64,
        val_loss:      f64,
        mlm_accuracy:  f64,
        nsp_accuracy:  Option<f64>,
        learning_rate: f64,
    ) -> Self {
        Self { epoch, train_loss, val_loss, mlm_accuracy, nsp_accuracy, learning_rate }
    }

    fn csv_row(&self) -> String {
        let nsp = self.nsp_accuracy.map(|a| format!("{a:.6}")).unwrap_or_default();
        format!(
            "{},{:.6},{:.6},{:.6},{},{:.6}",
            self.epoch, self.train_loss, self.val_loss, self.mlm_accuracy, nsp, self.learning_rate,
        )
    }
}

/// Logs epoch metrics to `<dir>/metrics.csv`.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }
        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;
        writeln!(f, "{}", m.csv_row())?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:.4}",
            m.epoch,
            m.train_loss,
            m.val_loss,
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}
