// ============================================================
// Layer 6 - Checkpoint Manager
// ============================================================
// One training run leaves two files in the weights directory:
//
//   weights/
//     best_model.mpk.gz   ← (model record, optimizer record) pair
//     run_config.json     ← architecture, class count, optimizer,
//                           class names, best accuracy
//
// The record pair is written once, after training, from the best
// validation snapshot. run_config.json is written before training
// starts and updated at the end; prediction reads it first so it
// can rebuild the same architecture and optimizer type before
// loading the record into them.
//
// Records use Burn's named MessagePack + gzip format at full
// precision, so a run resumed from the file continues exactly.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use burn::{
    module::AutodiffModule,
    optim::Optimizer,
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::domain::architecture::{Architecture, OptimizerKind};

/// Record format for checkpoints and pretrained backbones (.mpk.gz)
pub type WeightsRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

const CHECKPOINT_NAME: &str = "best_model";
const CONFIG_FILE:     &str = "run_config.json";

// ─── RunConfig ────────────────────────────────────────────────────────────────
/// What prediction needs to rebuild the trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub architecture:  Architecture,
    pub num_classes:   usize,
    pub optimizer:     OptimizerKind,
    /// Square side length images were resized and cropped to
    pub input_size:    usize,
    /// Dataset class names in label order
    pub class_names:   Vec<String>,
    /// Filled in once training finishes
    #[serde(default)]
    pub best_accuracy: Option<f64>,
    #[serde(default)]
    pub best_epoch:    Option<usize>,
}

// ─── CheckpointManager ────────────────────────────────────────────────────────
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Use `dir` for checkpoints, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create weights directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record path without extension; the recorder appends `.mpk.gz`
    fn record_path(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_NAME)
    }

    /// Full path of the checkpoint file on disk
    pub fn checkpoint_file(&self) -> PathBuf {
        self.dir.join(format!("{CHECKPOINT_NAME}.mpk.gz"))
    }

    pub fn has_checkpoint(&self) -> bool {
        self.checkpoint_file().is_file()
    }

    /// Write the (model, optimizer) state pair.
    pub fn save_checkpoint<B, M, O>(&self, model: &M, optim: &O) -> Result<()>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let record = (model.clone().into_record(), optim.to_record());
        let path   = self.record_path();

        <WeightsRecorder as Recorder<B>>::record(&WeightsRecorder::new(), record, path)
            .with_context(|| {
                format!("Failed to save checkpoint to '{}'", self.checkpoint_file().display())
            })?;

        tracing::info!("Saved checkpoint to '{}'", self.checkpoint_file().display());
        Ok(())
    }

    /// Restore a freshly built model and optimizer from the checkpoint.
    ///
    /// Fails if the file is missing or was written for a different
    /// architecture, class count or optimizer type.
    pub fn load_checkpoint<B, M, O>(&self, model: M, optim: O, device: &B::Device) -> Result<(M, O)>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let (model_record, optim_record): (M::Record, O::Record) =
            <WeightsRecorder as Recorder<B>>::load(&WeightsRecorder::new(), self.record_path(), device)
                .with_context(|| {
                    format!(
                        "Cannot load checkpoint '{}'. Have you run 'train' with the same architecture?",
                        self.checkpoint_file().display()
                    )
                })?;

        let expected = model.num_params();
        let model    = model.load_record(model_record);
        if model.num_params() != expected {
            bail!(
                "Checkpoint '{}' holds {} parameters, the current model has {}",
                self.checkpoint_file().display(),
                model.num_params(),
                expected
            );
        }

        tracing::info!("Loaded checkpoint from '{}'", self.checkpoint_file().display());
        Ok((model, optim.load_record(optim_record)))
    }

    pub fn save_config(&self, cfg: &RunConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;

        fs::write(&path, json)
            .with_context(|| format!("Cannot write run config to '{}'", path.display()))?;

        tracing::debug!("Saved run config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<RunConfig> {
        let path = self.dir.join(CONFIG_FILE);

        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read run config from '{}'. Make sure you have run 'train' before 'predict'.",
                path.display()
            )
        })?;

        serde_json::from_str(&json)
            .with_context(|| format!("Malformed run config '{}'", path.display()))
    }
}
