// ============================================================
// Layer 5 - Conv + BatchNorm Block
// ============================================================
// The unit both backbones are assembled from: a bias-free 2D
// convolution with "half kernel" padding, then batch norm.
// Activations are left to the caller (ReLU in ResNet, SiLU in
// EfficientNet).

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d,
    },
    prelude::*,
};

/// Convolution followed by batch normalisation, no bias on the conv.
/// The building block both backbones are assembled from.
#[derive(Module, Debug)]
pub struct ConvBn<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn:   BatchNorm<B, 2>,
}

/// Shape and normalisation settings for a [`ConvBn`].
#[derive(Debug, Clone, Copy)]
pub struct ConvBnSpec {
    pub in_channels:  usize,
    pub out_channels: usize,
    pub kernel:       usize,
    pub stride:       usize,
    pub groups:       usize,
    pub bn_epsilon:   f64,
    pub bn_momentum:  f64,
}

impl ConvBnSpec {
    pub fn new(in_channels: usize, out_channels: usize, kernel: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel,
            stride: 1,
            groups: 1,
            bn_epsilon: 1e-5,
            bn_momentum: 0.1,
        }
    }

    pub fn stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    /// Depthwise when `groups == in_channels`
    pub fn groups(mut self, groups: usize) -> Self {
        self.groups = groups;
        self
    }

    pub fn batch_norm(mut self, epsilon: f64, momentum: f64) -> Self {
        self.bn_epsilon  = epsilon;
        self.bn_momentum = momentum;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvBn<B> {
        // Symmetric "half kernel" padding keeps H/W at 1/stride
        let pad = self.kernel / 2;
        let conv = Conv2dConfig::new([self.in_channels, self.out_channels], [self.kernel, self.kernel])
            .with_stride([self.stride, self.stride])
            .with_padding(PaddingConfig2d::Explicit(pad, pad))
            .with_groups(self.groups)
            .with_bias(false)
            .init(device);
        let bn = BatchNormConfig::new(self.out_channels)
            .with_epsilon(self.bn_epsilon)
            .with_momentum(self.bn_momentum)
            .init(device);
        ConvBn { conv, bn }
    }
}

impl<B: Backend> ConvBn<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}
