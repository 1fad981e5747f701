// ============================================================
// Layer 5 - EfficientNet Classifier
// ============================================================
// EfficientNet B0-B7 (Tan & Le, 2019). Every level shares the B0
// block table; width and depth coefficients scale it up.
//
//   stem 3×3/2 → 7 stages of MBConv → 1×1 head conv
//              → global average pool → dropout → fc
//
// MBConv: 1×1 expand → depthwise k×k → squeeze-excite → 1×1 project,
// SiLU activations, residual when shape is preserved.
//
// Unlike ResNet-50, all parameters stay trainable.

use std::path::Path;

use anyhow::{bail, Context, Result};
use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::{sigmoid, silu},
};

use crate::domain::architecture::MAX_EFFICIENTNET_LEVEL;
use crate::infra::checkpoint::WeightsRecorder;
use crate::ml::classifier::ImageClassifier;
use crate::ml::layers::{ConvBn, ConvBnSpec};

const BN_EPSILON:  f64 = 1e-3;
const BN_MOMENTUM: f64 = 0.01;
const SE_RATIO:    f64 = 0.25;
const STEM_FILTERS: usize = 32;
const HEAD_FILTERS: usize = 1280;

/// One stage of the B0 table
#[derive(Debug, Clone, Copy)]
struct StageArgs {
    expand_ratio: usize,
    kernel:       usize,
    stride:       usize,
    in_filters:   usize,
    out_filters:  usize,
    repeats:      usize,
}

const fn stage(
    expand_ratio: usize,
    kernel: usize,
    stride: usize,
    in_filters: usize,
    out_filters: usize,
    repeats: usize,
) -> StageArgs {
    StageArgs { expand_ratio, kernel, stride, in_filters, out_filters, repeats }
}

const B0_STAGES: [StageArgs; 7] = [
    stage(1, 3, 1, 32, 16, 1),
    stage(6, 3, 2, 16, 24, 2),
    stage(6, 5, 2, 24, 40, 2),
    stage(6, 3, 2, 40, 80, 3),
    stage(6, 5, 1, 80, 112, 3),
    stage(6, 5, 2, 112, 192, 4),
    stage(6, 3, 1, 192, 320, 1),
];

/// Compound scaling per level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scaling {
    pub width:   f64,
    pub depth:   f64,
    pub dropout: f64,
}

const SCALING: [Scaling; 8] = [
    Scaling { width: 1.0, depth: 1.0, dropout: 0.2 },
    Scaling { width: 1.0, depth: 1.1, dropout: 0.2 },
    Scaling { width: 1.1, depth: 1.2, dropout: 0.3 },
    Scaling { width: 1.2, depth: 1.4, dropout: 0.3 },
    Scaling { width: 1.4, depth: 1.8, dropout: 0.4 },
    Scaling { width: 1.6, depth: 2.2, dropout: 0.4 },
    Scaling { width: 1.8, depth: 2.6, dropout: 0.5 },
    Scaling { width: 2.0, depth: 3.1, dropout: 0.5 },
];

pub fn scaling(level: u8) -> Result<Scaling> {
    if level > MAX_EFFICIENTNET_LEVEL {
        bail!("EfficientNet level must be 0..={MAX_EFFICIENTNET_LEVEL}, got {level}");
    }
    Ok(SCALING[level as usize])
}

/// Scale a channel count by `width` and snap it to a multiple of 8,
/// never dropping more than 10% below the scaled value.
pub fn round_filters(filters: usize, width: f64) -> usize {
    const DIVISOR: f64 = 8.0;
    let scaled  = filters as f64 * width;
    let mut new = (((scaled + DIVISOR / 2.0) / DIVISOR).floor() * DIVISOR).max(DIVISOR);
    if new < 0.9 * scaled {
        new += DIVISOR;
    }
    new as usize
}

pub fn round_repeats(repeats: usize, depth: f64) -> usize {
    (repeats as f64 * depth).ceil() as usize
}

// ─── MBConv ───────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct MbConv<B: Backend> {
    pub expand:       Option<ConvBn<B>>,
    pub depthwise:    ConvBn<B>,
    pub se_pool:      AdaptiveAvgPool2d,
    pub se_reduce:    Conv2d<B>,
    pub se_expand:    Conv2d<B>,
    pub project:      ConvBn<B>,
    pub use_residual: bool,
}

impl<B: Backend> MbConv<B> {
    fn new(
        in_filters:   usize,
        out_filters:  usize,
        expand_ratio: usize,
        kernel:       usize,
        stride:       usize,
        device:       &B::Device,
    ) -> Self {
        let hidden = in_filters * expand_ratio;
        let squeezed = ((in_filters as f64 * SE_RATIO) as usize).max(1);

        let expand = (expand_ratio != 1).then(|| {
            ConvBnSpec::new(in_filters, hidden, 1)
                .batch_norm(BN_EPSILON, BN_MOMENTUM)
                .init(device)
        });
        let depthwise = ConvBnSpec::new(hidden, hidden, kernel)
            .stride(stride)
            .groups(hidden)
            .batch_norm(BN_EPSILON, BN_MOMENTUM)
            .init(device);
        let project = ConvBnSpec::new(hidden, out_filters, 1)
            .batch_norm(BN_EPSILON, BN_MOMENTUM)
            .init(device);

        Self {
            expand,
            depthwise,
            se_pool:   AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            se_reduce: Conv2dConfig::new([hidden, squeezed], [1, 1]).init(device),
            se_expand: Conv2dConfig::new([squeezed, hidden], [1, 1]).init(device),
            project,
            use_residual: stride == 1 && in_filters == out_filters,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let h = match &self.expand {
            Some(expand) => silu(expand.forward(x.clone())),
            None         => x.clone(),
        };
        let h = silu(self.depthwise.forward(h));

        // Squeeze-excite: per-channel gate in (0, 1), broadcast over H×W
        let gate = self.se_pool.forward(h.clone());
        let gate = silu(self.se_reduce.forward(gate));
        let gate = sigmoid(self.se_expand.forward(gate));
        let h = h * gate;

        let h = self.project.forward(h);
        if self.use_residual {
            h + x
        } else {
            h
        }
    }
}

// ─── Backbone ─────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct EfficientNetFeatures<B: Backend> {
    pub stem:    ConvBn<B>,
    pub blocks:  Vec<MbConv<B>>,
    pub head:    ConvBn<B>,
    pub avgpool: AdaptiveAvgPool2d,
}

impl<B: Backend> EfficientNetFeatures<B> {
    pub fn new(scale: Scaling, device: &B::Device) -> Self {
        let stem_filters = round_filters(STEM_FILTERS, scale.width);
        let stem = ConvBnSpec::new(3, stem_filters, 3)
            .stride(2)
            .batch_norm(BN_EPSILON, BN_MOMENTUM)
            .init(device);

        let mut blocks = Vec::new();
        for args in B0_STAGES {
            let in_filters  = round_filters(args.in_filters, scale.width);
            let out_filters = round_filters(args.out_filters, scale.width);
            for i in 0..round_repeats(args.repeats, scale.depth) {
                // Only the first block of a stage changes stride or width
                let (input, stride) = if i == 0 {
                    (in_filters, args.stride)
                } else {
                    (out_filters, 1)
                };
                blocks.push(MbConv::new(
                    input,
                    out_filters,
                    args.expand_ratio,
                    args.kernel,
                    stride,
                    device,
                ));
            }
        }

        let last = round_filters(B0_STAGES[B0_STAGES.len() - 1].out_filters, scale.width);
        let head = ConvBnSpec::new(last, Self::head_filters(scale), 1)
            .batch_norm(BN_EPSILON, BN_MOMENTUM)
            .init(device);

        Self {
            stem,
            blocks,
            head,
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
        }
    }

    pub fn head_filters(scale: Scaling) -> usize {
        round_filters(HEAD_FILTERS, scale.width)
    }

    /// [N, 3, S, S] → [N, head_filters]
    pub fn features(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = silu(self.stem.forward(images));
        let x = self.blocks.iter().fold(x, |x, block| block.forward(x));
        let x = silu(self.head.forward(x));
        self.avgpool.forward(x).flatten(1, 3)
    }
}

// ─── Classifier ───────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct EfficientNetClassifierConfig {
    pub num_classes: usize,
    /// Compound scaling level, 0 (B0) through 7 (B7)
    #[config(default = 0)]
    pub level: u8,
}

impl EfficientNetClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<EfficientNetClassifier<B>> {
        let scale = scaling(self.level)?;
        Ok(self.assemble(EfficientNetFeatures::new(scale, device), scale, device))
    }

    /// Build with backbone parameters restored from a burn record file.
    pub fn init_pretrained<B: Backend>(
        &self,
        weights: &Path,
        device:  &B::Device,
    ) -> Result<EfficientNetClassifier<B>> {
        let scale = scaling(self.level)?;
        let features = EfficientNetFeatures::new(scale, device)
            .load_file(weights.to_path_buf(), &WeightsRecorder::new(), device)
            .with_context(|| {
                format!(
                    "Failed to load EfficientNet-b{} weights from '{}'",
                    self.level,
                    weights.display()
                )
            })?;
        tracing::info!(
            "Loaded pretrained EfficientNet-b{} backbone from '{}'",
            self.level,
            weights.display()
        );
        Ok(self.assemble(features, scale, device))
    }

    fn assemble<B: Backend>(
        &self,
        features: EfficientNetFeatures<B>,
        scale:    Scaling,
        device:   &B::Device,
    ) -> EfficientNetClassifier<B> {
        let fc = LinearConfig::new(EfficientNetFeatures::<B>::head_filters(scale), self.num_classes)
            .init(device);

        EfficientNetClassifier {
            features,
            dropout: DropoutConfig::new(scale.dropout).init(),
            fc,
            num_classes: self.num_classes,
        }
    }
}

#[derive(Module, Debug)]
pub struct EfficientNetClassifier<B: Backend> {
    pub features:    EfficientNetFeatures<B>,
    pub dropout:     Dropout,
    pub fc:          Linear<B>,
    pub num_classes: usize,
}

impl<B: Backend> ImageClassifier<B> for EfficientNetClassifier<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.features.features(images);
        self.fc.forward(self.dropout.forward(x))
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = NdArray;

    #[test]
    fn round_filters_snaps_to_multiples_of_eight() {
        assert_eq!(round_filters(32, 1.0), 32);
        assert_eq!(round_filters(1280, 1.0), 1280);
        assert_eq!(round_filters(32, 1.1), 32);
        assert_eq!(round_filters(1280, 1.1), 1408);
        assert_eq!(round_filters(32, 1.2), 40);
        assert_eq!(round_filters(1280, 2.0), 2560);
        assert_eq!(round_filters(4, 1.0), 8);
    }

    #[test]
    fn round_repeats_rounds_up() {
        assert_eq!(round_repeats(1, 1.0), 1);
        assert_eq!(round_repeats(2, 1.1), 3);
        assert_eq!(round_repeats(4, 3.1), 13);
    }

    #[test]
    fn b0_has_sixteen_blocks() {
        let model = EfficientNetFeatures::<TestBackend>::new(scaling(0).unwrap(), &Default::default());
        assert_eq!(model.blocks.len(), 16);
        assert_eq!(EfficientNetFeatures::<TestBackend>::head_filters(scaling(0).unwrap()), 1280);
    }

    #[test]
    fn rejects_levels_past_b7() {
        assert!(scaling(7).is_ok());
        assert!(scaling(8).is_err());
        assert!(EfficientNetClassifierConfig::new(2)
            .with_level(9)
            .init::<TestBackend>(&Default::default())
            .is_err());
    }

    #[test]
    fn produces_one_logit_per_class() {
        let device = Default::default();
        let model  = EfficientNetClassifierConfig::new(4).init::<TestBackend>(&device).unwrap();
        let logits = model.forward(Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device));
        assert_eq!(logits.dims(), [2, 4]);
    }

    #[test]
    fn whole_network_is_trainable() {
        type B = Autodiff<TestBackend>;
        let device = Default::default();
        let model  = EfficientNetClassifierConfig::new(2).init::<B>(&device).unwrap();

        let grads = model
            .forward(Tensor::<B, 4>::ones([2, 3, 32, 32], &device))
            .sum()
            .backward();

        assert!(model.fc.weight.grad(&grads).is_some());
        assert!(model.features.stem.conv.weight.grad(&grads).is_some());
    }
}
