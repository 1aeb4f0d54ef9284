//! Whole-batch views over a dataset
//!
//! Burn's multi-worker loader hands each worker a contiguous slice of the
//! dataset. Every item here is already a full batch, so worker slices always
//! end on batch boundaries and one pass yields exactly `len / batch_size`
//! full batches for any worker count. A trailing partial batch is dropped.

use burn::data::dataset::Dataset;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::dataset::tensor_dataset::{ImageItem, TensorDataset};

#[derive(Debug, Clone)]
pub struct BatchChunks {
    dataset: TensorDataset,
    /// Dataset positions of each batch
    chunks: Vec<Vec<usize>>,
    batch_size: usize,
}

impl BatchChunks {
    /// Consecutive batches in dataset order
    pub fn sequential(dataset: TensorDataset, batch_size: usize) -> Self {
        let order: Vec<usize> = (0..dataset.len()).collect();
        Self::from_order(dataset, order, batch_size)
    }

    /// Batches drawn from a fresh permutation of the whole dataset
    pub fn shuffled(dataset: TensorDataset, batch_size: usize, rng: &mut ChaCha8Rng) -> Self {
        let mut order: Vec<usize> = (0..dataset.len()).collect();
        order.shuffle(rng);
        Self::from_order(dataset, order, batch_size)
    }

    fn from_order(dataset: TensorDataset, order: Vec<usize>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        let chunks = order
            .chunks_exact(batch_size)
            .map(<[usize]>::to_vec)
            .collect();
        Self {
            dataset,
            chunks,
            batch_size,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Samples covered by the full batches
    pub fn num_samples(&self) -> usize {
        self.chunks.len() * self.batch_size
    }

    pub fn positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.chunks.iter().flatten().copied()
    }
}

impl Dataset<Vec<ImageItem>> for BatchChunks {
    fn get(&self, index: usize) -> Option<Vec<ImageItem>> {
        self.chunks
            .get(index)?
            .iter()
            .map(|&p| self.dataset.get(p))
            .collect()
    }

    fn len(&self) -> usize {
        self.chunks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn dataset(n: usize) -> TensorDataset {
        let labels: Vec<usize> = (0..n).map(|i| i % 2).collect();
        let features: Vec<f32> = (0..n).map(|i| i as f32).collect();
        TensorDataset::new(features, labels, [1, 1, 1], 2).unwrap()
    }

    #[test]
    fn test_trailing_partial_batch_is_dropped() {
        let chunks = BatchChunks::sequential(dataset(23), 5);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks.num_samples(), 20);
        assert!(chunks.iter().all(|batch| batch.len() == 5));

        let first: Vec<f32> = chunks.get(0).unwrap().iter().map(|i| i.pixels[0]).collect();
        assert_eq!(first, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert!(chunks.get(4).is_none());
    }

    #[test]
    fn test_shuffle_is_global() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let chunks = BatchChunks::shuffled(dataset(40), 8, &mut rng);

        let mut seen: Vec<usize> = chunks.positions().collect();
        assert_ne!(seen, (0..40).collect::<Vec<_>>());
        seen.sort();
        assert_eq!(seen, (0..40).collect::<Vec<_>>());

        // Another epoch draws another permutation
        let again = BatchChunks::shuffled(dataset(40), 8, &mut rng);
        assert_ne!(
            chunks.positions().collect::<Vec<_>>(),
            again.positions().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_smaller_than_one_batch() {
        let chunks = BatchChunks::sequential(dataset(3), 4);
        assert!(chunks.is_empty());
        assert_eq!(chunks.num_samples(), 0);
    }
}
