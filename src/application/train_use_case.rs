// ============================================================
// Layer 2 - TrainUseCase
// ============================================================
// Orchestrates one fine-tuning run in order:
//
//   Step 1: Resolve input resolution      (Layer 3 - domain)
//   Step 2: Build train / val loaders     (Layer 4 - data)
//   Step 3: Check the class count         (Layer 4 - data)
//   Step 4: Save the run config           (Layer 6 - infra)
//   Step 5: Open the metrics sink         (Layer 6 - infra)
//   Step 6: Build model + optimizer, train (Layer 5 - ml)
//   Step 7: Record the best result        (Layer 6 - infra)

use std::path::PathBuf;

use anyhow::{bail, Result};
use burn::{
    module::{AutodiffModule, Module},
    optim::Optimizer,
    tensor::backend::AutodiffBackend,
};

use crate::data::loader::{get_loader, PhaseLoaders};
use crate::domain::{
    architecture::{Architecture, OptimizerKind},
    phase::EpochReport,
    traits::MetricsSink,
};
use crate::infra::{
    checkpoint::{CheckpointManager, RunConfig},
    metrics::MetricsWriter,
};
use crate::ml::{
    classifier::{ClassifierSpec, ClassifierTask, ImageClassifier},
    default_device,
    optimizer::{with_optimizer, OptimizerTask},
    scheduler::StepLr,
    trainer::{train_model, PhaseSources},
    TrainBackend,
};

// ─── Training Configuration ──────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Dataset root holding `train/` and `val/`
    pub root:         PathBuf,
    pub architecture: Architecture,
    pub optimizer:    OptimizerKind,
    pub num_epochs:   usize,
    pub num_classes:  usize,
    pub batch_size:   usize,
    /// Seeds the per-epoch shuffle of the train phase
    pub seed:         u64,
    pub weights_dir:  PathBuf,
    pub log_dir:      PathBuf,
    /// Burn record with backbone weights
    pub pretrained:   Option<PathBuf>,
    /// Overrides the architecture's native resolution
    pub image_size:   Option<usize>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            root:         PathBuf::from("data/hymenoptera_data"),
            architecture: Architecture::ResNet50,
            optimizer:    OptimizerKind::Sgd,
            num_epochs:   25,
            num_classes:  2,
            batch_size:   4,
            seed:         42,
            weights_dir:  PathBuf::from("weights"),
            log_dir:      PathBuf::from("logs"),
            pretrained:   None,
            image_size:   None,
        }
    }
}

impl TrainConfig {
    pub fn input_size(&self) -> usize {
        self.image_size.unwrap_or_else(|| self.architecture.input_size())
    }
}

/// Result of a finished run
#[derive(Debug, Clone)]
pub struct TrainSummary {
    pub best_accuracy: f64,
    pub best_epoch:    usize,
    pub history:       Vec<EpochReport>,
    pub class_names:   Vec<String>,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Train on the default WGPU device
    pub fn execute(&self) -> Result<TrainSummary> {
        let device = default_device();
        self.execute_on::<TrainBackend>(&device)
    }

    pub fn execute_on<B: AutodiffBackend>(&self, device: &B::Device) -> Result<TrainSummary> {
        let cfg = &self.config;

        // ── Step 1: Input resolution ─────────────────────────────────────────
        let input_size = cfg.input_size();
        tracing::info!(
            "Fine-tuning {} at {}x{} with {} for {} epochs",
            cfg.architecture,
            input_size,
            input_size,
            cfg.optimizer,
            cfg.num_epochs
        );

        // ── Step 2: Loaders ──────────────────────────────────────────────────
        let loaders = get_loader::<B>(&cfg.root, input_size, cfg.batch_size, cfg.seed, device)?;

        // ── Step 3: Class count must fit the new head ────────────────────────
        let found = loaders.class_names.len();
        if found > cfg.num_classes {
            bail!(
                "Dataset '{}' has {} classes {:?} but the classifier head has only {} outputs (--num-classes)",
                cfg.root.display(),
                found,
                loaders.class_names,
                cfg.num_classes
            );
        }
        if found < cfg.num_classes {
            tracing::warn!(
                "Dataset has {} classes, head has {} outputs; the extra outputs are never targeted",
                found,
                cfg.num_classes
            );
        }

        // ── Step 4: Run config for prediction ────────────────────────────────
        let checkpoints = CheckpointManager::new(&cfg.weights_dir)?;
        let mut run_config = RunConfig {
            architecture:  cfg.architecture,
            num_classes:   cfg.num_classes,
            optimizer:     cfg.optimizer,
            input_size,
            class_names:   loaders.class_names.clone(),
            best_accuracy: None,
            best_epoch:    None,
        };
        checkpoints.save_config(&run_config)?;

        // ── Step 5: Metrics sink, flushed when dropped ───────────────────────
        let mut metrics = MetricsWriter::new(&cfg.log_dir)?;

        // ── Step 6: Model, optimizer, training loop ──────────────────────────
        if cfg.pretrained.is_none() {
            tracing::warn!(
                "No --pretrained weights given, {} backbone starts from random initialisation",
                cfg.architecture
            );
        }
        let spec = ClassifierSpec::new(cfg.architecture, cfg.num_classes)
            .with_pretrained(cfg.pretrained.clone());

        let summary = spec.build::<B, _>(
            device,
            TrainWithModel {
                config:      cfg,
                loaders:     &loaders,
                metrics:     &mut metrics,
                checkpoints: &checkpoints,
            },
        )?;

        // ── Step 7: Best result ──────────────────────────────────────────────
        run_config.best_accuracy = Some(summary.best_accuracy);
        run_config.best_epoch    = Some(summary.best_epoch);
        checkpoints.save_config(&run_config)?;

        tracing::info!(
            "Best val acc {:.4} at epoch {}, checkpoint in '{}'",
            summary.best_accuracy,
            summary.best_epoch,
            checkpoints.dir().display()
        );
        Ok(summary)
    }
}

// ─── Tasks ────────────────────────────────────────────────────────────────────
// The classifier and optimizer types are only known once the
// architecture and optimizer flags are resolved, so training runs
// inside these two tasks.

struct TrainWithModel<'a, B: AutodiffBackend> {
    config:      &'a TrainConfig,
    loaders:     &'a PhaseLoaders<B>,
    metrics:     &'a mut dyn MetricsSink,
    checkpoints: &'a CheckpointManager,
}

impl<'a, B: AutodiffBackend> ClassifierTask<B> for TrainWithModel<'a, B> {
    type Output = TrainSummary;

    fn run<M>(self, model: M) -> Result<TrainSummary>
    where
        M: ImageClassifier<B> + AutodiffModule<B> + 'static,
        M::InnerModule: ImageClassifier<B::InnerBackend>,
    {
        let kind = self.config.optimizer;
        with_optimizer::<B, M, _>(kind, TrainWithOptimizer { model, ctx: self })
    }
}

struct TrainWithOptimizer<'a, B: AutodiffBackend, M> {
    model: M,
    ctx:   TrainWithModel<'a, B>,
}

impl<'a, B, M> OptimizerTask<B, M> for TrainWithOptimizer<'a, B, M>
where
    B: AutodiffBackend,
    M: ImageClassifier<B> + AutodiffModule<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
{
    type Output = TrainSummary;

    fn run<O: Optimizer<M, B>>(self, optim: O) -> Result<TrainSummary> {
        let TrainWithOptimizer { model, ctx } = self;
        let mut scheduler = StepLr::with_defaults(OptimizerKind::LEARNING_RATE);

        let outcome = train_model::<B, M, O>(
            model,
            optim,
            PhaseSources { train: &ctx.loaders.train, val: &ctx.loaders.val },
            &mut scheduler,
            ctx.config.num_epochs,
            ctx.metrics,
            ctx.checkpoints,
        )?;
        tracing::debug!("Best model restored ({} parameters)", outcome.model.num_params());
        tracing::debug!(
            "Scheduler stepped {} times, final lr {:e}",
            scheduler.steps(),
            scheduler.current_lr()
        );

        Ok(TrainSummary {
            best_accuracy: outcome.best_accuracy,
            best_epoch:    outcome.best_epoch,
            history:       outcome.history,
            class_names:   ctx.loaders.class_names.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use image::{Rgb, RgbImage};
    use std::path::Path;
    use tempfile::TempDir;

    use crate::application::predict_use_case::{PredictConfig, PredictUseCase};

    type TestBackend = Autodiff<NdArray>;

    fn write_image(path: &Path, colour: [u8; 3]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(40, 30, Rgb(colour)).save(path).unwrap();
    }

    /// Two colour-coded classes, two images each per phase
    fn tiny_dataset(root: &Path) {
        for phase in ["train", "val"] {
            write_image(&root.join(format!("{phase}/ants/a.png")), [200, 30, 30]);
            write_image(&root.join(format!("{phase}/ants/b.png")), [220, 40, 20]);
            write_image(&root.join(format!("{phase}/bees/c.png")), [30, 30, 200]);
            write_image(&root.join(format!("{phase}/bees/d.png")), [20, 40, 220]);
        }
    }

    fn config(dir: &Path) -> TrainConfig {
        TrainConfig {
            root:         dir.join("data"),
            architecture: Architecture::EfficientNet { level: 0 },
            num_epochs:   1,
            batch_size:   2,
            weights_dir:  dir.join("weights"),
            log_dir:      dir.join("logs"),
            image_size:   Some(32),
            ..TrainConfig::default()
        }
    }

    #[test]
    fn defaults_match_the_command_line() {
        let cfg = TrainConfig::default();
        assert_eq!(cfg.root, PathBuf::from("data/hymenoptera_data"));
        assert_eq!(cfg.architecture, Architecture::ResNet50);
        assert_eq!(cfg.optimizer, OptimizerKind::Sgd);
        assert_eq!(cfg.num_epochs, 25);
        assert_eq!(cfg.num_classes, 2);
        assert_eq!(cfg.input_size(), 224);
    }

    #[test]
    fn too_many_dataset_classes_is_an_error() {
        let dir = TempDir::new().unwrap();
        tiny_dataset(&dir.path().join("data"));
        write_image(&dir.path().join("data/train/wasps/e.png"), [1, 2, 3]);
        write_image(&dir.path().join("data/val/wasps/f.png"), [1, 2, 3]);

        let result = TrainUseCase::new(config(dir.path())).execute_on::<TestBackend>(&Default::default());
        assert!(result.is_err());
        assert!(!dir.path().join("weights/best_model.mpk.gz").exists());
    }

    #[test]
    fn train_then_predict() {
        let dir = TempDir::new().unwrap();
        tiny_dataset(&dir.path().join("data"));
        let cfg = config(dir.path());

        let summary = TrainUseCase::new(cfg.clone())
            .execute_on::<TestBackend>(&Default::default())
            .unwrap();
        assert_eq!(summary.class_names, vec!["ants", "bees"]);
        assert_eq!(summary.history.len(), 1);
        assert!((0.0..=1.0).contains(&summary.best_accuracy));

        let checkpoints = CheckpointManager::new(&cfg.weights_dir).unwrap();
        assert!(checkpoints.has_checkpoint());
        let run_config = checkpoints.load_config().unwrap();
        assert_eq!(run_config.input_size, 32);
        assert_eq!(run_config.best_epoch, Some(summary.best_epoch));

        let csv = std::fs::read_to_string(cfg.log_dir.join("scalars.csv")).unwrap();
        assert_eq!(csv.lines().count(), 1 + 4);

        let prediction = PredictUseCase::new(PredictConfig {
            image:       dir.path().join("data/val/bees/c.png"),
            weights_dir: cfg.weights_dir.clone(),
            top_k:       2,
        })
        .execute_on::<TestBackend>(&Default::default())
        .unwrap();

        assert!(summary.class_names.contains(&prediction.class_name));
        assert_eq!(prediction.top_k.len(), 2);
    }
}
