// ============================================================
// Layer 6 - Metrics Writer
// ============================================================
// File-backed MetricsSink. Every scalar the training loop emits
// becomes one CSV row:
//
//   tag,step,value
//   loss,1,0.612345
//   acc,1,0.704918
//   val loss,1,0.401122
//   val acc,1,0.888889
//   ...
//
// Output file: {log_dir}/scalars.csv. A new run appends to an
// existing file; the header is written only when it is created.
//
// The writer is owned by the caller and handed to the loop as
// `&mut dyn MetricsSink`. Rows are buffered and reach the disk
// on flush() or when the writer is dropped.

use std::{
    fs::{self, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::domain::traits::MetricsSink;

const CSV_FILE:   &str = "scalars.csv";
const CSV_HEADER: &str = "tag,step,value";

pub struct MetricsWriter {
    csv_path: PathBuf,
    out:      BufWriter<fs::File>,
}

impl MetricsWriter {
    /// Open (or create) `{dir}/scalars.csv` for appending.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create log directory '{}'", dir.display()))?;

        let csv_path = dir.join(CSV_FILE);
        let is_new   = !csv_path.exists();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&csv_path)
            .with_context(|| format!("Cannot open metrics file '{}'", csv_path.display()))?;
        let mut out = BufWriter::new(file);

        if is_new {
            writeln!(out, "{CSV_HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path, out })
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

impl MetricsSink for MetricsWriter {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        writeln!(self.out, "{tag},{step},{value:.6}")
            .with_context(|| format!("Cannot write to '{}'", self.csv_path.display()))?;
        tracing::debug!("{} @ {} = {:.4}", tag, step, value);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out
            .flush()
            .with_context(|| format!("Cannot flush '{}'", self.csv_path.display()))
    }
}

impl Drop for MetricsWriter {
    fn drop(&mut self) {
        if let Err(e) = self.out.flush() {
            tracing::warn!("Lost buffered metrics for '{}': {}", self.csv_path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let path = {
            let mut writer = MetricsWriter::new(dir.path().join("logs")).unwrap();
            writer.add_scalar("loss", 0.5, 1).unwrap();
            writer.add_scalar("val acc", 0.75, 1).unwrap();
            writer.csv_path().to_path_buf()
        };

        let csv = fs::read_to_string(path).unwrap();
        assert_eq!(csv, "tag,step,value\nloss,1,0.500000\nval acc,1,0.750000\n");
    }

    #[test]
    fn flush_makes_rows_visible_before_drop() {
        let dir = TempDir::new().unwrap();
        let mut writer = MetricsWriter::new(dir.path()).unwrap();
        writer.add_scalar("acc", 1.0, 3).unwrap();
        writer.flush().unwrap();

        let csv = fs::read_to_string(writer.csv_path()).unwrap();
        assert!(csv.ends_with("acc,3,1.000000\n"));
    }

    #[test]
    fn second_run_appends_without_repeating_header() {
        let dir = TempDir::new().unwrap();
        for step in 1..=2 {
            let mut writer = MetricsWriter::new(dir.path()).unwrap();
            writer.add_scalar("loss", 0.1, step).unwrap();
        }

        let csv = fs::read_to_string(dir.path().join(CSV_FILE)).unwrap();
        assert_eq!(csv.matches(CSV_HEADER).count(), 1);
        assert_eq!(csv.lines().count(), 3);
    }
}
