// ============================================================
// Layer 5 - ResNet-50 Classifier
// ============================================================
// Bottleneck ResNet-50 (He et al., 2016) with a fresh linear
// head sized to the target class count.
//
//   [N,3,S,S] → stem 7×7/2 → maxpool 3×3/2
//             → 4 stages of bottlenecks [3, 4, 6, 3]
//             → global average pool → [N, 2048]
//             → fc → [N, num_classes]
//
// Fine-tuning mode: the backbone starts trainable and is frozen
// after every optimizer step. The first train step therefore
// updates the whole network; every later step only moves fc.

use std::path::Path;

use anyhow::{Context, Result};
use burn::{
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

use crate::infra::checkpoint::WeightsRecorder;
use crate::ml::classifier::ImageClassifier;
use crate::ml::layers::{ConvBn, ConvBnSpec};

/// Channel count of the backbone's pooled feature vector
pub const RESNET50_FEATURES: usize = 2048;

const STAGE_BLOCKS: [usize; 4] = [3, 4, 6, 3];
const STAGE_WIDTHS: [usize; 4] = [64, 128, 256, 512];
const EXPANSION:    usize      = 4;

// ─── Bottleneck ───────────────────────────────────────────────────────────────
/// 1×1 reduce → 3×3 (strided) → 1×1 expand, plus identity or projection.
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    pub reduce:     ConvBn<B>,
    pub spatial:    ConvBn<B>,
    pub expand:     ConvBn<B>,
    pub downsample: Option<ConvBn<B>>,
}

impl<B: Backend> Bottleneck<B> {
    fn new(in_channels: usize, width: usize, stride: usize, device: &B::Device) -> Self {
        let out_channels = width * EXPANSION;
        let downsample = (stride != 1 || in_channels != out_channels).then(|| {
            ConvBnSpec::new(in_channels, out_channels, 1)
                .stride(stride)
                .init(device)
        });

        Self {
            reduce:  ConvBnSpec::new(in_channels, width, 1).init(device),
            spatial: ConvBnSpec::new(width, width, 3).stride(stride).init(device),
            expand:  ConvBnSpec::new(width, out_channels, 1).init(device),
            downsample,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(projection) => projection.forward(x.clone()),
            None             => x.clone(),
        };

        let out = relu(self.reduce.forward(x));
        let out = relu(self.spatial.forward(out));
        let out = self.expand.forward(out);
        relu(out + identity)
    }
}

// ─── Backbone ─────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct ResNet50<B: Backend> {
    pub stem:    ConvBn<B>,
    pub maxpool: MaxPool2d,
    pub blocks:  Vec<Bottleneck<B>>,
    pub avgpool: AdaptiveAvgPool2d,
}

impl<B: Backend> ResNet50<B> {
    pub fn new(device: &B::Device) -> Self {
        let stem = ConvBnSpec::new(3, 64, 7).stride(2).init(device);
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let mut blocks = Vec::with_capacity(STAGE_BLOCKS.iter().sum());
        let mut in_channels = 64;
        for (stage, (&count, &width)) in STAGE_BLOCKS.iter().zip(STAGE_WIDTHS.iter()).enumerate() {
            for i in 0..count {
                // First block of stages 2-4 halves the resolution
                let stride = if stage > 0 && i == 0 { 2 } else { 1 };
                blocks.push(Bottleneck::new(in_channels, width, stride, device));
                in_channels = width * EXPANSION;
            }
        }

        Self {
            stem,
            maxpool,
            blocks,
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
        }
    }

    /// [N, 3, S, S] → [N, 2048]
    pub fn features(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = relu(self.stem.forward(images));
        let x = self.maxpool.forward(x);
        let x = self.blocks.iter().fold(x, |x, block| block.forward(x));
        self.avgpool.forward(x).flatten(1, 3)
    }
}

// ─── Classifier ───────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct ResNetClassifierConfig {
    pub num_classes: usize,
    /// Stop backbone gradients after the first optimizer step
    #[config(default = true)]
    pub freeze_backbone: bool,
}

impl ResNetClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNetClassifier<B> {
        self.assemble(ResNet50::new(device), device)
    }

    /// Build with backbone parameters restored from a burn record file.
    pub fn init_pretrained<B: Backend>(
        &self,
        weights: &Path,
        device:  &B::Device,
    ) -> Result<ResNetClassifier<B>> {
        let backbone = ResNet50::new(device)
            .load_file(weights.to_path_buf(), &WeightsRecorder::new(), device)
            .with_context(|| format!("Failed to load ResNet-50 weights from '{}'", weights.display()))?;
        tracing::info!("Loaded pretrained ResNet-50 backbone from '{}'", weights.display());
        Ok(self.assemble(backbone, device))
    }

    fn assemble<B: Backend>(&self, backbone: ResNet50<B>, device: &B::Device) -> ResNetClassifier<B> {
        let fc = LinearConfig::new(RESNET50_FEATURES, self.num_classes).init(device);

        ResNetClassifier {
            backbone,
            fc,
            num_classes:     self.num_classes,
            freeze_backbone: self.freeze_backbone,
        }
    }
}

#[derive(Module, Debug)]
pub struct ResNetClassifier<B: Backend> {
    pub backbone:        ResNet50<B>,
    pub fc:              Linear<B>,
    pub num_classes:     usize,
    pub freeze_backbone: bool,
}

impl<B: Backend> ImageClassifier<B> for ResNetClassifier<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.fc.forward(self.backbone.features(images))
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn after_train_step(self) -> Self {
        if !self.freeze_backbone {
            return self;
        }
        Self {
            backbone: self.backbone.no_grad(),
            ..self
        }
    }
}
