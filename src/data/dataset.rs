// ============================================================
// Layer 4 - Image Folder Dataset
// ============================================================
// Implements Burn's Dataset trait over a scanned ImageFolder.
// Nothing is decoded up front; `get(i)` reads, resizes and
// crops image i, so memory stays flat for large folders.

use burn::data::dataset::Dataset;

use crate::data::folder::{ImageFolder, ImageSample};
use crate::data::preprocess::preprocess_file;

/// One preprocessed image: CHW pixels in [0, 1] plus its label.
#[derive(Debug, Clone)]
pub struct ImageItem {
    pub pixels: Vec<f32>,
    pub label:  usize,
    /// Square side length of `pixels`
    pub size:   usize,
}

impl ImageItem {
    pub fn new(pixels: Vec<f32>, label: usize, size: usize) -> Self {
        debug_assert_eq!(pixels.len(), 3 * size * size);
        Self { pixels, label, size }
    }
}

/// Lazily decodes images from an [`ImageFolder`] on `get`.
#[derive(Debug, Clone)]
pub struct ImageFolderDataset {
    samples:    Vec<ImageSample>,
    input_size: usize,
}

impl ImageFolderDataset {
    pub fn new(folder: &ImageFolder, input_size: usize) -> Self {
        Self { samples: folder.samples().to_vec(), input_size }
    }
}

impl Dataset<ImageItem> for ImageFolderDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        let sample = self.samples.get(index)?;
        match preprocess_file(&sample.path, self.input_size) {
            Ok(pixels) => Some(ImageItem::new(pixels, sample.label, self.input_size)),
            Err(e) => {
                tracing::error!("Failed to load '{}': {:#}", sample.path.display(), e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
