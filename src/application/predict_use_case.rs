// ============================================================
// Layer 2 - PredictUseCase
// ============================================================
// Classifies one image with the checkpoint of a previous run:
//
//   Step 1: Read run_config.json          (Layer 6 - infra)
//   Step 2: Rebuild model + optimizer     (Layer 5 - ml)
//   Step 3: Load the checkpoint into both (Layer 6 - infra)
//   Step 4: Predict in evaluation mode    (Layer 5 - ml)

use std::path::PathBuf;

use anyhow::{bail, Result};
use burn::{module::AutodiffModule, optim::Optimizer, tensor::backend::AutodiffBackend};

use crate::infra::checkpoint::{CheckpointManager, RunConfig};
use crate::ml::{
    classifier::{ClassifierSpec, ClassifierTask, ImageClassifier},
    default_device,
    inferencer::{Inferencer, Prediction},
    optimizer::{with_optimizer, OptimizerTask},
    TrainBackend,
};

#[derive(Debug, Clone)]
pub struct PredictConfig {
    pub image:       PathBuf,
    pub weights_dir: PathBuf,
    /// Length of the printed ranking
    pub top_k:       usize,
}

pub struct PredictUseCase {
    config: PredictConfig,
}

impl PredictUseCase {
    pub fn new(config: PredictConfig) -> Self {
        Self { config }
    }

    /// Predict on the default WGPU device
    pub fn execute(&self) -> Result<Prediction> {
        let device = default_device();
        self.execute_on::<TrainBackend>(&device)
    }

    pub fn execute_on<B: AutodiffBackend>(&self, device: &B::Device) -> Result<Prediction> {
        let cfg = &self.config;

        if !cfg.image.is_file() {
            bail!("Image '{}' does not exist", cfg.image.display());
        }
        if !cfg.weights_dir.is_dir() {
            bail!(
                "Weights directory '{}' not found. Have you run 'train' first?",
                cfg.weights_dir.display()
            );
        }

        // ── Step 1: What was trained ─────────────────────────────────────────
        let checkpoints = CheckpointManager::new(&cfg.weights_dir)?;
        let run_config  = checkpoints.load_config()?;
        if !checkpoints.has_checkpoint() {
            bail!(
                "No checkpoint at '{}'. Training must finish before prediction.",
                checkpoints.checkpoint_file().display()
            );
        }
        tracing::info!(
            "Rebuilding {} with {} classes ({} optimizer)",
            run_config.architecture,
            run_config.num_classes,
            run_config.optimizer
        );

        // ── Steps 2-4 ────────────────────────────────────────────────────────
        ClassifierSpec::new(run_config.architecture, run_config.num_classes).build::<B, _>(
            device,
            PredictWithModel {
                config:      cfg,
                run_config:  &run_config,
                checkpoints: &checkpoints,
                device,
            },
        )
    }
}

// ─── Tasks ────────────────────────────────────────────────────────────────────

struct PredictWithModel<'a, B: AutodiffBackend> {
    config:      &'a PredictConfig,
    run_config:  &'a RunConfig,
    checkpoints: &'a CheckpointManager,
    device:      &'a B::Device,
}

impl<'a, B: AutodiffBackend> ClassifierTask<B> for PredictWithModel<'a, B> {
    type Output = Prediction;

    fn run<M>(self, model: M) -> Result<Prediction>
    where
        M: ImageClassifier<B> + AutodiffModule<B> + 'static,
        M::InnerModule: ImageClassifier<B::InnerBackend>,
    {
        let kind = self.run_config.optimizer;
        with_optimizer::<B, M, _>(kind, PredictWithOptimizer { model, ctx: self })
    }
}

struct PredictWithOptimizer<'a, B: AutodiffBackend, M> {
    model: M,
    ctx:   PredictWithModel<'a, B>,
}

impl<'a, B, M> OptimizerTask<B, M> for PredictWithOptimizer<'a, B, M>
where
    B: AutodiffBackend,
    M: ImageClassifier<B> + AutodiffModule<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
{
    type Output = Prediction;

    fn run<O: Optimizer<M, B>>(self, optim: O) -> Result<Prediction> {
        let PredictWithOptimizer { model, ctx } = self;

        // Optimizer state is restored too; only the model is used below
        let (model, _optim) = ctx.checkpoints.load_checkpoint::<B, M, O>(model, optim, ctx.device)?;

        let inferencer = Inferencer::<B::InnerBackend, M::InnerModule>::new(
            model.valid(),
            ctx.run_config.input_size,
            ctx.run_config.class_names.clone(),
            ctx.device.clone(),
        );
        inferencer.predict(&ctx.config.image, ctx.config.top_k)
    }
}
