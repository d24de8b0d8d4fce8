// ============================================================
// Layer 6 - Training History and Metrics Logger
// ============================================================
// Every epoch produces one EpochMetrics row. The trainer keeps
// the rows in a History attached to the compiled model; the
// MetricsLogger appends them to a CSV file.
//
// Output file: <checkpoint dir>/metrics.csv, rewritten by every
// training run so its epochs always count up from 1:
//
//   epoch,loss,acc,val_loss,val_acc,steps,validation_steps
//   1,2.312500,0.187500,2.104400,0.250000,4,2
//   2,1.903100,0.312500,1.876300,0.375000,4,2
//
// A loss that keeps falling while val_loss rises is overfitting.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

const CSV_HEADER: &str = "epoch,loss,acc,val_loss,val_acc,steps,validation_steps";

/// Metrics of a single training epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Starts at 1
    pub epoch: usize,

    /// Sample-weighted mean cross-entropy over the training steps
    pub loss: f64,

    /// Fraction of training samples classified correctly, in [0, 1]
    pub acc: f64,

    pub val_loss: f64,
    pub val_acc: f64,

    /// Training batches consumed this epoch
    pub steps: usize,

    /// Validation batches evaluated this epoch
    pub validation_steps: usize,
}

impl EpochMetrics {
    /// Returns true if this epoch improved over the previous best val_loss
    pub fn is_improvement(&self, best_val_loss: f64) -> bool {
        self.val_loss < best_val_loss
    }
}

/// Ordered per-epoch metrics of one model, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    epochs: Vec<EpochMetrics>,
}

impl History {
    pub fn push(&mut self, metrics: EpochMetrics) {
        self.epochs.push(metrics);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    pub fn epochs(&self) -> &[EpochMetrics] {
        &self.epochs
    }

    /// Epoch with the lowest validation loss.
    pub fn best(&self) -> Option<&EpochMetrics> {
        self.epochs
            .iter()
            .fold(None, |best: Option<&EpochMetrics>, m| match best {
                Some(b) if !m.is_improvement(b.val_loss) => Some(b),
                _ => Some(m),
            })
    }
}

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Start the metrics log of a new training run.
    /// Any log left by an earlier run in `dir` is replaced.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create metrics directory '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");

        if csv_path.exists() {
            tracing::debug!("Replacing metrics of an earlier run: '{}'", csv_path.display());
        }
        // File::create truncates
        let mut f = fs::File::create(&csv_path)
            .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
        writeln!(f, "{CSV_HEADER}")?;

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row in the CSV.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6},{},{}",
            m.epoch, m.loss, m.acc, m.val_loss, m.val_acc, m.steps, m.validation_steps,
        )?;

        tracing::debug!(
            "Logged epoch {} metrics: loss={:.4}, val_loss={:.4}",
            m.epoch,
            m.loss,
            m.val_loss,
        );

        Ok(())
    }

    /// Append every epoch of `history`.
    pub fn log_history(&self, history: &History) -> Result<()> {
        history.epochs().iter().try_for_each(|m| self.log(m))
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}
