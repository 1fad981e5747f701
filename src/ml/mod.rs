// ============================================================
// Layer 5 - ML / Model Layer (Burn)
// ============================================================
// Networks, optimisation and the training loop:
//
//   layers.rs       - Conv + BatchNorm block shared by both backbones
//   resnet.rs       - ResNet-50, backbone frozen after step 1 + new fc head
//   efficientnet.rs - EfficientNet B0..B7, fully trainable
//   classifier.rs   - ImageClassifier trait, architecture dispatch
//   optimizer.rs    - Adam / SGD(momentum) factory
//   scheduler.rs    - StepLR decay
//   trainer.rs      - train / validate epochs, best snapshot, checkpoint
//   inferencer.rs   - softmax prediction for one image file
//
// Runs use the WGPU backend; autodiff wraps it for training and
// AutodiffModule::valid() unwraps it for validation and inference.
// Tests run the same generic code on NdArray.

use burn::backend::{wgpu::WgpuDevice, Autodiff, Wgpu};

/// Backend for training runs; `valid()` drops to plain `Wgpu`
pub type TrainBackend = Autodiff<Wgpu>;

/// Compute target, chosen once at startup
pub fn default_device() -> WgpuDevice {
    let device = WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    device
}

pub mod layers;

/// Bottleneck ResNet-50 classifier
pub mod resnet;

/// EfficientNet B0-B7 classifiers
pub mod efficientnet;

/// Shared inference interface and construction by architecture
pub mod classifier;

pub mod optimizer;

pub mod scheduler;

/// Epoch loop with best-checkpoint tracking
pub mod trainer;

/// Single-image prediction
pub mod inferencer;

#[cfg(test)]
pub mod onehot;
