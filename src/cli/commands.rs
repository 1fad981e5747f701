// ============================================================
// Layer 1 - CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `predict`, and their
// flags. Long names and defaults follow the historical command
// line; the old short spellings (-opt, -arc, -cl, -lvl, -im)
// remain available as long aliases (--opt, --arc, ...).

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::application::{predict_use_case::PredictConfig, train_use_case::TrainConfig};
use crate::domain::architecture::{Architecture, OptimizerKind};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fine-tune a classifier on an ImageFolder dataset
    Train(TrainArgs),

    /// Classify one image with the best checkpoint of a previous run
    Predict(PredictArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Dataset folder with train/ and val/ class sub-directories
    #[arg(short = 'd', long, default_value = "data/hymenoptera_data")]
    pub root: PathBuf,

    /// `Adam` selects Adam; anything else selects SGD with momentum
    #[arg(long, alias = "opt", default_value = "SGD")]
    pub optimizer: String,

    /// Number of train + validate passes
    #[arg(long, default_value_t = 25)]
    pub epochs: usize,

    /// `efficientNet` (or `efficientnet-bN`) selects EfficientNet,
    /// anything else ResNet-50
    #[arg(long, alias = "arc", default_value = "resent")]
    pub architecture: String,

    /// Outputs of the new classification head
    #[arg(long, aliases = ["cl", "num_classes"], default_value_t = 2)]
    pub num_classes: usize,

    /// EfficientNet level, 0 (B0) to 7 (B7)
    #[arg(long, alias = "lvl", default_value_t = 0)]
    pub efftlevel: u8,

    #[arg(long, default_value_t = 4)]
    pub batch_size: usize,

    /// Seed for the per-epoch shuffle of the training images
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Where best_model.mpk.gz and run_config.json are written
    #[arg(long, default_value = "weights")]
    pub weights_dir: PathBuf,

    /// Where scalars.csv is written
    #[arg(long, default_value = "logs")]
    pub log_dir: PathBuf,

    /// Burn record (.mpk.gz) with pretrained backbone weights
    #[arg(long)]
    pub pretrained: Option<PathBuf>,

    /// Square input size; defaults to the architecture's native resolution
    #[arg(long)]
    pub image_size: Option<usize>,
}

/// The architecture flag can be invalid (e.g. `efficientnet-b9`),
/// so this boundary is fallible.
impl TryFrom<TrainArgs> for TrainConfig {
    type Error = anyhow::Error;

    fn try_from(a: TrainArgs) -> Result<Self> {
        Ok(TrainConfig {
            root:         a.root,
            architecture: Architecture::from_flag(&a.architecture, a.efftlevel)?,
            optimizer:    OptimizerKind::from_flag(&a.optimizer),
            num_epochs:   a.epochs,
            num_classes:  a.num_classes,
            batch_size:   a.batch_size,
            seed:         a.seed,
            weights_dir:  a.weights_dir,
            log_dir:      a.log_dir,
            pretrained:   a.pretrained,
            image_size:   a.image_size,
        })
    }
}

#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Image file to classify
    #[arg(long, alias = "im")]
    pub image: PathBuf,

    /// Directory written by `train`
    #[arg(long, default_value = "weights")]
    pub weights_dir: PathBuf,

    /// Number of ranked classes to print (at most 5)
    #[arg(long, default_value_t = 3)]
    pub top_k: usize,
}

impl From<PredictArgs> for PredictConfig {
    fn from(a: PredictArgs) -> Self {
        PredictConfig {
            image:       a.image,
            weights_dir: a.weights_dir,
            top_k:       a.top_k,
        }
    }
}
