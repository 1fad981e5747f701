// ============================================================
// Layer 3 - Phase and Epoch Metrics
// ============================================================
// One epoch is a train pass followed by a validation pass.
// Each pass accumulates two running totals over its batches:
//
//   running_loss     = sum(batch_mean_loss * batch_size)
//   running_corrects = sum(correct predictions in batch)
//
// and is normalised by the phase's known sample count:
//
//   epoch_loss = running_loss     / sample_count
//   epoch_acc  = running_corrects / sample_count

use anyhow::{bail, Result};
use std::fmt;

/// Which half of an epoch is running.
/// Train updates parameters, Validate is read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Train,
    Validate,
}

impl Phase {
    /// Both phases in the order an epoch runs them
    pub const ALL: [Phase; 2] = [Phase::Train, Phase::Validate];

    /// Short name, also the dataset sub-directory for the phase
    pub fn name(self) -> &'static str {
        match self {
            Phase::Train    => "train",
            Phase::Validate => "val",
        }
    }

    /// Metric tag for the epoch loss of this phase
    pub fn loss_tag(self) -> &'static str {
        match self {
            Phase::Train    => "loss",
            Phase::Validate => "val loss",
        }
    }

    /// Metric tag for the epoch accuracy of this phase
    pub fn acc_tag(self) -> &'static str {
        match self {
            Phase::Train    => "acc",
            Phase::Validate => "val acc",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── PhaseTotals ──────────────────────────────────────────────────────────────
/// Running sums for one phase of one epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseTotals {
    pub running_loss:     f64,
    pub running_corrects: usize,
    pub seen:             usize,
}

impl PhaseTotals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one batch into the totals.
    /// `mean_loss` is the batch-averaged loss the criterion returns.
    pub fn add_batch(&mut self, mean_loss: f64, batch_size: usize, correct: usize) {
        self.running_loss     += mean_loss * batch_size as f64;
        self.running_corrects += correct;
        self.seen             += batch_size;
    }

    /// Running loss averaged over the samples seen so far (progress display)
    pub fn mean_loss(&self) -> f64 {
        if self.seen == 0 {
            0.0
        } else {
            self.running_loss / self.seen as f64
        }
    }
}

// ─── EpochMetrics ─────────────────────────────────────────────────────────────
/// Normalised loss / accuracy of one phase of one epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochMetrics {
    pub epoch:    usize,
    pub phase:    Phase,
    pub loss:     f64,
    pub accuracy: f64,
}

impl EpochMetrics {
    /// Normalise running totals by the phase's known sample count.
    pub fn from_totals(
        epoch:        usize,
        phase:        Phase,
        totals:       &PhaseTotals,
        sample_count: usize,
    ) -> Result<Self> {
        if sample_count == 0 {
            bail!("phase '{phase}' has no samples; cannot normalise epoch metrics");
        }
        let n = sample_count as f64;
        Ok(Self {
            epoch,
            phase,
            loss:     totals.running_loss / n,
            accuracy: totals.running_corrects as f64 / n,
        })
    }
}

// ─── EpochReport ──────────────────────────────────────────────────────────────
/// Train and validation metrics for one finished epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    pub train:   EpochMetrics,
    pub val:     EpochMetrics,
    pub is_best: bool,
}
