// ============================================================
// Layer 5 - One-Hot Test Classifier (tests only)
// ============================================================
// Tiny deterministic classifier for loop and checkpoint tests.
//
// Inputs are one-hot images [N, C, 1, 1] scaled by 10, and
//   logits = x + 1e-3 · head(x)
// The head trains normally, but its contribution is too small
// to ever flip a prediction, so a test fully controls accuracy
// through the labels it feeds in.

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
};

use crate::data::batcher::ImageBatch;
use crate::ml::classifier::ImageClassifier;

const HOT: f32 = 10.0;
const HEAD_SCALE: f64 = 1e-3;

#[derive(Module, Debug)]
pub struct OneHotClassifier<B: Backend> {
    pub head:        Linear<B>,
    pub num_classes: usize,
}

impl<B: Backend> OneHotClassifier<B> {
    pub fn new(num_classes: usize, device: &B::Device) -> Self {
        Self {
            head: LinearConfig::new(num_classes, num_classes).init(device),
            num_classes,
        }
    }

    pub fn head_weights(&self) -> Vec<f32> {
        self.head.weight.val().into_data().iter::<f32>().collect()
    }
}

impl<B: Backend> ImageClassifier<B> for OneHotClassifier<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x: Tensor<B, 2> = images.flatten(1, 3);
        x.clone() + self.head.forward(x) * HEAD_SCALE
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

/// Batch whose sample `i` predicts class `hot[i]` and is labelled `labels[i]`.
pub fn one_hot_batch<B: Backend>(hot: &[usize], labels: &[i64], device: &B::Device) -> ImageBatch<B> {
    let classes = 2;
    let mut pixels = vec![0.0f32; hot.len() * classes];
    for (i, &h) in hot.iter().enumerate() {
        pixels[i * classes + h] = HOT;
    }

    ImageBatch {
        images:  Tensor::from_floats(TensorData::new(pixels, [hot.len(), classes, 1, 1]), device),
        targets: Tensor::from_data(TensorData::new(labels.to_vec(), [labels.len()]), device),
    }
}
