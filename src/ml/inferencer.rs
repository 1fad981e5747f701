// ============================================================
// Layer 5 - Single-Image Inference
// ============================================================
// Runs one image through a trained classifier in evaluation mode:
//
//   file → preprocess (resize, center crop) → ImageNet normalise
//        → forward → softmax → arg-max class + top-k ranking

use std::path::Path;

use anyhow::Result;
use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::activation::softmax,
};

use crate::data::{
    batcher::{ImageBatch, ImageBatcher},
    dataset::ImageItem,
    preprocess::preprocess_file,
};
use crate::ml::classifier::ImageClassifier;

/// Longest ranking a prediction reports
pub const MAX_TOP_K: usize = 5;

// ─── Prediction ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct RankedClass {
    pub index:       usize,
    pub name:        String,
    pub probability: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class_index:   usize,
    pub class_name:    String,
    pub confidence:    f32,
    /// Softmax over every head output, in label order
    pub probabilities: Vec<f32>,
    /// Most probable classes first
    pub top_k:         Vec<RankedClass>,
}

impl Prediction {
    /// Rank softmax output. Ties keep label order.
    pub fn from_probabilities(probabilities: Vec<f32>, class_names: &[String], k: usize) -> Self {
        let name_of = |index: usize| {
            class_names
                .get(index)
                .cloned()
                .unwrap_or_else(|| format!("class {index}"))
        };

        let mut order: Vec<usize> = (0..probabilities.len()).collect();
        order.sort_by(|&a, &b| probabilities[b].total_cmp(&probabilities[a]));

        let top_k: Vec<RankedClass> = order
            .iter()
            .take(k.clamp(1, MAX_TOP_K))
            .map(|&index| RankedClass {
                index,
                name: name_of(index),
                probability: probabilities[index],
            })
            .collect();

        let (class_index, confidence) = top_k
            .first()
            .map(|best| (best.index, best.probability))
            .unwrap_or((0, 0.0));

        Self {
            class_index,
            class_name: name_of(class_index),
            confidence,
            probabilities,
            top_k,
        }
    }
}

// ─── Inferencer ───────────────────────────────────────────────────────────────
/// A classifier on an inference backend plus what it needs to read images.
pub struct Inferencer<B: Backend, M> {
    model:       M,
    input_size:  usize,
    class_names: Vec<String>,
    batcher:     ImageBatcher,
    device:      B::Device,
}

impl<B: Backend, M: ImageClassifier<B>> Inferencer<B, M> {
    /// `model` should already be in evaluation mode (`AutodiffModule::valid`).
    pub fn new(model: M, input_size: usize, class_names: Vec<String>, device: B::Device) -> Self {
        Self {
            model,
            input_size,
            class_names,
            batcher: ImageBatcher::new(),
            device,
        }
    }

    pub fn predict(&self, image: &Path, top_k: usize) -> Result<Prediction> {
        let pixels = preprocess_file(image, self.input_size)?;
        let item   = ImageItem::new(pixels, 0, self.input_size);
        let batch: ImageBatch<B> = self.batcher.batch(vec![item], &self.device);

        let logits = self.model.forward(batch.images);
        let probabilities: Vec<f32> = softmax(logits, 1).into_data().iter::<f32>().collect();

        let prediction = Prediction::from_probabilities(probabilities, &self.class_names, top_k);
        tracing::debug!(
            "'{}' → {} ({:.4})",
            image.display(),
            prediction.class_name,
            prediction.confidence
        );
        tracing::debug!("class probabilities: {:?}", prediction.probabilities);
        Ok(prediction)
    }
}
