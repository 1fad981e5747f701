// ============================================================
// Layer 4 - Batch Sources
// ============================================================
// The training loop consumes one BatchSource per phase. It only
// needs three things from it: how many samples the phase has
// (to normalise epoch metrics), how many batches to expect
// (progress bar length), and the batches themselves, in order.

use anyhow::Result;
use burn::prelude::*;

use crate::data::batcher::ImageBatch;

pub trait BatchSource<B: Backend> {
    /// Known sample count of the phase
    fn num_samples(&self) -> usize;

    /// Number of batches one pass will yield
    fn num_batches(&self) -> usize;

    /// One full pass over the phase. A failed batch aborts the pass.
    fn batches(&self) -> Box<dyn Iterator<Item = Result<ImageBatch<B>>> + '_>;
}

/// Pre-built batches replayed in order on every pass.
impl<B: Backend> BatchSource<B> for Vec<ImageBatch<B>> {
    fn num_samples(&self) -> usize {
        self.iter().map(ImageBatch::len).sum()
    }

    fn num_batches(&self) -> usize {
        self.len()
    }

    fn batches(&self) -> Box<dyn Iterator<Item = Result<ImageBatch<B>>> + '_> {
        Box::new(self.iter().cloned().map(Ok))
    }
}
