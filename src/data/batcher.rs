// ============================================================
// Layer 4 - Image Batcher
// ============================================================
// Implements Burn's Batcher trait to stack preprocessed images
// into one tensor batch on the compute device.
//
//   Input:  Vec of N ImageItems, each 3×S×S floats in [0, 1]
//   Output: images  [N, 3, S, S]  ImageNet-normalised
//           targets [N]           class labels

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::ImageItem;

/// ImageNet channel means (RGB) the pretrained backbones expect
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

// ─── ImageBatch ───────────────────────────────────────────────────────────────
/// A batch of labelled images ready for the forward pass.
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// Normalised pixels - shape: [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,

    /// Ground truth class indices - shape: [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> ImageBatch<B> {
    /// Number of samples in the batch
    pub fn len(&self) -> usize {
        self.targets.dims()[0]
    }

    /// Spatial side length of the images
    pub fn image_size(&self) -> usize {
        self.images.dims()[3]
    }
}

// ─── ImageBatcher ─────────────────────────────────────────────────────────────
#[derive(Clone, Debug, Default)]
pub struct ImageBatcher;

impl ImageBatcher {
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let size       = items.first().map(|i| i.size).unwrap_or(0);

        let pixels: Vec<f32> = items
            .iter()
            .flat_map(|item| item.pixels.iter().copied())
            .collect();

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(pixels, [batch_size, 3, size, size]),
            device,
        );

        // (x - mean) / std, broadcast over [1, 3, 1, 1]
        let mean = Tensor::<B, 4>::from_floats(
            TensorData::new(IMAGENET_MEAN.to_vec(), [1, 3, 1, 1]),
            device,
        );
        let std = Tensor::<B, 4>::from_floats(
            TensorData::new(IMAGENET_STD.to_vec(), [1, 3, 1, 1]),
            device,
        );
        let images = (images - mean) / std;

        let labels: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(labels, [batch_size]),
            device,
        );

        ImageBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn stacks_items_into_nchw() {
        let device = Default::default();
        let items = vec![
            ImageItem::new(vec![0.5; 3 * 4 * 4], 1, 4),
            ImageItem::new(vec![0.0; 3 * 4 * 4], 0, 4),
        ];
        let batch: ImageBatch<TestBackend> = ImageBatcher::new().batch(items, &device);

        assert_eq!(batch.images.dims(), [2, 3, 4, 4]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.image_size(), 4);

        let targets: Vec<i64> = batch.targets.into_data().iter::<i64>().collect();
        assert_eq!(targets, vec![1, 0]);
    }

    #[test]
    fn applies_imagenet_normalisation() {
        let device = Default::default();
        // A pixel exactly at the channel mean normalises to zero
        let mut pixels = Vec::new();
        for c in 0..3 {
            pixels.push(IMAGENET_MEAN[c]);
        }
        let batch: ImageBatch<TestBackend> =
            ImageBatcher::new().batch(vec![ImageItem::new(pixels, 0, 1)], &device);

        let values: Vec<f32> = batch.images.into_data().iter::<f32>().collect();
        assert!(values.iter().all(|v| v.abs() < 1e-6));
    }
}
