// ============================================================
// Layer 5 - Classifier Seam
// ============================================================
// The training loop, checkpointing and inference are written
// once against ImageClassifier. Which concrete network runs is
// decided at runtime from the architecture flag, so construction
// hands the built model to a ClassifierTask: the task's generic
// `run` is monomorphised per architecture and never needs an
// enum over module types.

use std::path::PathBuf;

use anyhow::Result;
use burn::{module::AutodiffModule, prelude::*, tensor::backend::AutodiffBackend};

use crate::domain::architecture::Architecture;
use crate::ml::{efficientnet::EfficientNetClassifierConfig, resnet::ResNetClassifierConfig};

/// Image batch in, one logit per class out.
pub trait ImageClassifier<B: Backend>: Module<B> {
    /// [N, 3, S, S] → [N, num_classes]
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    fn num_classes(&self) -> usize;

    /// Called by the training loop after every optimizer step.
    fn after_train_step(self) -> Self
    where
        Self: Sized,
    {
        self
    }
}

/// Work to run on whichever classifier the architecture selects.
pub trait ClassifierTask<B: AutodiffBackend> {
    type Output;

    fn run<M>(self, model: M) -> Result<Self::Output>
    where
        M: ImageClassifier<B> + AutodiffModule<B> + 'static,
        M::InnerModule: ImageClassifier<B::InnerBackend>;
}

/// Everything needed to construct a classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierSpec {
    pub architecture: Architecture,
    pub num_classes:  usize,
    /// Burn record with backbone weights; None leaves them randomly initialised
    pub pretrained:   Option<PathBuf>,
}

impl ClassifierSpec {
    pub fn new(architecture: Architecture, num_classes: usize) -> Self {
        Self { architecture, num_classes, pretrained: None }
    }

    pub fn with_pretrained(mut self, weights: Option<PathBuf>) -> Self {
        self.pretrained = weights;
        self
    }

    /// Build the classifier on `device` and hand it to `task`.
    pub fn build<B, T>(&self, device: &B::Device, task: T) -> Result<T::Output>
    where
        B: AutodiffBackend,
        T: ClassifierTask<B>,
    {
        match self.architecture {
            Architecture::ResNet50 => {
                let config = ResNetClassifierConfig::new(self.num_classes);
                let model = match &self.pretrained {
                    Some(path) => config.init_pretrained::<B>(path, device)?,
                    None       => config.init::<B>(device),
                };
                tracing::info!(
                    "Built {} ({} parameters); backbone freezes after the first step, then {} train",
                    self.architecture,
                    model.num_params(),
                    model.fc.num_params()
                );
                task.run(model)
            }
            Architecture::EfficientNet { level } => {
                let config = EfficientNetClassifierConfig::new(self.num_classes).with_level(level);
                let model = match &self.pretrained {
                    Some(path) => config.init_pretrained::<B>(path, device)?,
                    None       => config.init::<B>(device)?,
                };
                tracing::info!(
                    "Built {} with {} trainable parameters",
                    self.architecture,
                    model.num_params()
                );
                task.run(model)
            }
        }
    }
}
