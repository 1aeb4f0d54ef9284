//! Burn batcher turning image items into normalized tensors

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::dataset::augmentation::{Augmenter, Normalizer};
use crate::dataset::tensor_dataset::ImageItem;

/// A batch of images for training or validation
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// Batch of images with shape [batch_size, channels, height, width]
    pub images: Tensor<B, 4>,
    /// Batch of labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Stacks items, optionally augments them, then normalizes
#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    device: B::Device,
    shape: [usize; 3],
    normalizer: Normalizer,
    augmenter: Option<Augmenter>,
    seed: u64,
    batches: Arc<AtomicU64>,
}

impl<B: Backend> ImageBatcher<B> {
    /// Batcher without augmentation (validation)
    pub fn new(device: B::Device, shape: [usize; 3], normalizer: Normalizer) -> Self {
        Self {
            device,
            shape,
            normalizer,
            augmenter: None,
            seed: 0,
            batches: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Augment every item before normalization, seeding each batch from `seed`
    pub fn with_augmenter(mut self, augmenter: Augmenter, seed: u64) -> Self {
        self.augmenter = Some(augmenter).filter(|a| !a.config().is_identity());
        self.seed = seed;
        self
    }
}

/// Pre-grouped batches from [`BatchChunks`](crate::dataset::BatchChunks)
impl<B: Backend> Batcher<Vec<ImageItem>, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, chunks: Vec<Vec<ImageItem>>) -> ImageBatch<B> {
        self.stack(chunks.into_iter().flatten().collect())
    }
}

impl<B: Backend> ImageBatcher<B> {
    fn stack(&self, items: Vec<ImageItem>) -> ImageBatch<B> {
        let batch_size = items.len();
        let [channels, height, width] = self.shape;

        let mut rng = self.augmenter.as_ref().map(|_| {
            let batch_idx = self.batches.fetch_add(1, Ordering::Relaxed);
            ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(batch_idx))
        });

        let mut images_data: Vec<f32> = Vec::with_capacity(batch_size * channels * height * width);
        let mut targets_data: Vec<i64> = Vec::with_capacity(batch_size);
        for item in items {
            let mut pixels = item.pixels;
            if let (Some(augmenter), Some(rng)) = (&self.augmenter, rng.as_mut()) {
                augmenter.augment(&mut pixels, self.shape, rng);
            }
            self.normalizer.normalize(&mut pixels);
            images_data.extend_from_slice(&pixels);
            targets_data.push(item.label as i64);
        }

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, channels, height, width]),
            &self.device,
        );
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(targets_data, [batch_size]),
            &self.device,
        );

        ImageBatch { images, targets }
    }
}
