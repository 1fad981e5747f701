// ============================================================
// Layer 4 - Phase Loaders
// ============================================================
// Builds the two batch sources a fine-tuning run needs:
//
//   root/train → PhaseLoader on the autodiff backend, reshuffled
//                every pass from a fixed seed
//   root/val   → PhaseLoader on the inner backend, fixed order
//
// Batches are assembled lazily: each pass computes the index
// order up front, then decodes and stacks one chunk of indices
// at a time so only one batch of images is in memory.

use std::cell::Cell;
use std::path::Path;

use anyhow::{bail, Context, Result};
use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::data::{
    batcher::{ImageBatch, ImageBatcher},
    dataset::{ImageFolderDataset, ImageItem},
    folder::ImageFolder,
    source::BatchSource,
};
use crate::domain::phase::Phase;

// ─── PhaseLoader ──────────────────────────────────────────────────────────────
/// Batches one phase's dataset onto a device.
pub struct PhaseLoader<B: Backend, D = ImageFolderDataset> {
    dataset:    D,
    batcher:    ImageBatcher,
    batch_size: usize,
    device:     B::Device,
    /// Seed for per-pass shuffling; None keeps dataset order
    shuffle:    Option<u64>,
    /// Passes started so far, mixed into the shuffle seed
    passes:     Cell<u64>,
}

impl<B: Backend, D: Dataset<ImageItem>> PhaseLoader<B, D> {
    pub fn new(dataset: D, batch_size: usize, device: B::Device) -> Self {
        Self {
            dataset,
            batcher: ImageBatcher::new(),
            batch_size: batch_size.max(1),
            device,
            shuffle: None,
            passes: Cell::new(0),
        }
    }

    /// Reshuffle the sample order on every pass, reproducibly from `seed`.
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.shuffle = Some(seed);
        self
    }

    fn pass_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if let Some(seed) = self.shuffle {
            let pass = self.passes.get();
            self.passes.set(pass + 1);
            let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(pass));
            order.shuffle(&mut rng);
        }
        order
    }

    fn load_batch(&self, indices: &[usize]) -> Result<ImageBatch<B>> {
        let items = indices
            .iter()
            .map(|&i| {
                self.dataset
                    .get(i)
                    .with_context(|| format!("Failed to load sample {i}"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Batcher::<B, ImageItem, ImageBatch<B>>::batch(&self.batcher, items, &self.device))
    }
}

impl<B: Backend, D: Dataset<ImageItem>> BatchSource<B> for PhaseLoader<B, D> {
    fn num_samples(&self) -> usize {
        self.dataset.len()
    }

    fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    fn batches(&self) -> Box<dyn Iterator<Item = Result<ImageBatch<B>>> + '_> {
        let chunks: Vec<Vec<usize>> = self
            .pass_order()
            .chunks(self.batch_size)
            .map(<[usize]>::to_vec)
            .collect();

        Box::new(chunks.into_iter().map(move |chunk| self.load_batch(&chunk)))
    }
}

// ─── PhaseLoaders ─────────────────────────────────────────────────────────────
/// Train and validation sources plus the class list they share.
pub struct PhaseLoaders<B: AutodiffBackend> {
    pub train:       PhaseLoader<B>,
    pub val:         PhaseLoader<B::InnerBackend>,
    pub class_names: Vec<String>,
}

/// Scan `root/train` and `root/val` and build both phase loaders.
pub fn get_loader<B: AutodiffBackend>(
    root:       impl AsRef<Path>,
    input_size: usize,
    batch_size: usize,
    seed:       u64,
    device:     &B::Device,
) -> Result<PhaseLoaders<B>> {
    let root = root.as_ref();

    let train_folder = ImageFolder::scan(root.join(Phase::Train.name()))?;
    let val_folder   = ImageFolder::scan(root.join(Phase::Validate.name()))?;

    if train_folder.class_names() != val_folder.class_names() {
        bail!(
            "Class directories differ between train {:?} and val {:?}",
            train_folder.class_names(),
            val_folder.class_names()
        );
    }
    for folder in [&train_folder, &val_folder] {
        if folder.is_empty() {
            bail!("No images found under '{}'", folder.root().display());
        }
    }

    let train = PhaseLoader::new(
        ImageFolderDataset::new(&train_folder, input_size),
        batch_size,
        device.clone(),
    )
    .with_shuffle(seed);

    let val = PhaseLoader::new(
        ImageFolderDataset::new(&val_folder, input_size),
        batch_size,
        device.clone(),
    );

    tracing::info!(
        "Loaded dataset '{}': {} train / {} val images, classes {:?}",
        root.display(),
        train_folder.len(),
        val_folder.len(),
        train_folder.class_names()
    );
    tracing::debug!(
        "Images per class: train {:?}, val {:?}",
        train_folder.class_counts(),
        val_folder.class_counts()
    );

    Ok(PhaseLoaders {
        train,
        val,
        class_names: train_folder.class_names().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::data::dataset::InMemDataset;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    type TestBackend = NdArray;

    fn items(n: usize) -> InMemDataset<ImageItem> {
        InMemDataset::new(
            (0..n)
                .map(|i| ImageItem::new(vec![0.0; 3], i, 1))
                .collect(),
        )
    }

    fn labels_of_pass(loader: &PhaseLoader<TestBackend, InMemDataset<ImageItem>>) -> Vec<i64> {
        loader
            .batches()
            .flat_map(|b| b.unwrap().targets.into_data().iter::<i64>().collect::<Vec<_>>())
            .collect()
    }

    #[test]
    fn unshuffled_loader_keeps_order_and_chunks() {
        let loader = PhaseLoader::<TestBackend, _>::new(items(10), 4, Default::default());
        assert_eq!(loader.num_samples(), 10);
        assert_eq!(loader.num_batches(), 3);

        let sizes: Vec<usize> = loader.batches().map(|b| b.unwrap().len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(labels_of_pass(&loader), (0..10).collect::<Vec<i64>>());
    }

    #[test]
    fn shuffled_loader_is_reproducible_and_reshuffles() {
        let a = PhaseLoader::<TestBackend, _>::new(items(32), 8, Default::default()).with_shuffle(7);
        let b = PhaseLoader::<TestBackend, _>::new(items(32), 8, Default::default()).with_shuffle(7);

        let a1 = labels_of_pass(&a);
        let a2 = labels_of_pass(&a);
        assert_eq!(a1, labels_of_pass(&b));
        assert_ne!(a1, a2);

        let mut sorted = a1.clone();
        sorted.sort();
        assert_eq!(sorted, (0..32).collect::<Vec<i64>>());
    }

    fn write_image(path: &Path, colour: [u8; 3]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(12, 10, Rgb(colour)).save(path).unwrap();
    }

    #[test]
    fn get_loader_reads_train_and_val_folders() {
        let dir = TempDir::new().unwrap();
        write_image(&dir.path().join("train/ants/a.png"), [255, 0, 0]);
        write_image(&dir.path().join("train/bees/b.png"), [0, 255, 0]);
        write_image(&dir.path().join("train/bees/c.png"), [0, 0, 255]);
        write_image(&dir.path().join("val/ants/d.png"), [255, 0, 0]);
        write_image(&dir.path().join("val/bees/e.png"), [0, 255, 0]);

        let loaders =
            get_loader::<Autodiff<TestBackend>>(dir.path(), 8, 2, 42, &Default::default()).unwrap();

        assert_eq!(loaders.class_names, vec!["ants", "bees"]);
        assert_eq!(loaders.train.num_samples(), 3);
        assert_eq!(loaders.val.num_samples(), 2);

        let val: Vec<_> = loaders.val.batches().collect::<Result<_>>().unwrap();
        assert_eq!(val.len(), 1);
        assert_eq!(val[0].images.dims(), [2, 3, 8, 8]);
    }

    #[test]
    fn mismatched_class_lists_are_rejected() {
        let dir = TempDir::new().unwrap();
        write_image(&dir.path().join("train/ants/a.png"), [1, 2, 3]);
        write_image(&dir.path().join("val/wasps/b.png"), [1, 2, 3]);

        let result = get_loader::<Autodiff<TestBackend>>(dir.path(), 8, 2, 42, &Default::default());
        assert!(result.is_err());
    }

    #[test]
    fn broken_image_fails_the_batch() {
        let dir = TempDir::new().unwrap();
        write_image(&dir.path().join("train/ants/a.png"), [1, 2, 3]);
        write_image(&dir.path().join("val/ants/b.png"), [1, 2, 3]);
        std::fs::write(dir.path().join("val/ants/c.jpg"), b"garbage").unwrap();

        let loaders =
            get_loader::<Autodiff<TestBackend>>(dir.path(), 8, 4, 42, &Default::default()).unwrap();
        let first = loaders.val.batches().next().unwrap();
        assert!(first.is_err());
    }
}
