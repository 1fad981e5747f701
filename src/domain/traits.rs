// ============================================================
// Layer 3 - Core Traits
// ============================================================
// Seams between the training loop and its collaborators.
// The loop only ever sees these traits, so tests can hand it
// an in-memory sink instead of a file on disk.

use anyhow::Result;

// ─── MetricsSink ──────────────────────────────────────────────────────────────
/// Destination for named scalar time series (loss, acc, val loss, val acc).
///
/// Implementations:
///   - MetricsWriter → CSV file under the log directory
///   - MemorySink    → Vec in memory (test builds only)
pub trait MetricsSink {
    /// Record `value` for series `tag` at `step` (the 1-based epoch).
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()>;

    /// Push buffered rows to their destination.
    fn flush(&mut self) -> Result<()>;
}

#[cfg(test)]
/// A single recorded scalar
#[derive(Debug, Clone, PartialEq)]
pub struct Scalar {
    pub tag:   String,
    pub step:  usize,
    pub value: f64,
}

#[cfg(test)]
/// Keeps every scalar in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub scalars: Vec<Scalar>,
}

#[cfg(test)]
impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All values recorded for `tag`, in step order of arrival
    pub fn series(&self, tag: &str) -> Vec<(usize, f64)> {
        self.scalars
            .iter()
            .filter(|s| s.tag == tag)
            .map(|s| (s.step, s.value))
            .collect()
    }
}

#[cfg(test)]
impl MetricsSink for MemorySink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        self.scalars.push(Scalar { tag: tag.to_string(), step, value });
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
