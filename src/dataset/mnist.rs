//! MNIST via Burn's vision datasets
//!
//! Images come out as 1 x 28 x 28 in `[0, 1]` with 10 classes. The files are
//! downloaded and cached by Burn on first use.

use burn::data::dataset::vision::{MnistDataset, MnistItem};
use burn::data::dataset::Dataset;
use tracing::info;

use crate::dataset::tensor_dataset::TensorDataset;
use crate::utils::error::Result;

pub const MNIST_CLASSES: usize = 10;
pub const MNIST_SIDE: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MnistSplit {
    Train,
    Test,
}

/// Load one MNIST split into memory
pub fn load_mnist(split: MnistSplit) -> Result<TensorDataset> {
    info!("Loading MNIST {:?} split", split);
    let source = match split {
        MnistSplit::Train => MnistDataset::train(),
        MnistSplit::Test => MnistDataset::test(),
    };
    let items: Vec<MnistItem> = source.iter().collect();
    let dataset = from_items(&items)?;
    info!("Loaded {} MNIST images", dataset.len());
    Ok(dataset)
}

fn from_items(items: &[MnistItem]) -> Result<TensorDataset> {
    let mut features = Vec::with_capacity(items.len() * MNIST_SIDE * MNIST_SIDE);
    let mut labels = Vec::with_capacity(items.len());

    for item in items {
        for row in item.image.iter() {
            features.extend(row.iter().map(|&v| v / 255.0));
        }
        labels.push(item.label as usize);
    }

    TensorDataset::new(features, labels, [1, MNIST_SIDE, MNIST_SIDE], MNIST_CLASSES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_items_are_scaled_to_unit_range() {
        let mut image = [[0.0f32; 28]; 28];
        image[0][1] = 255.0;
        image[27][27] = 51.0;
        let items = vec![
            MnistItem { image, label: 7 },
            MnistItem {
                image: [[0.0; 28]; 28],
                label: 0,
            },
        ];

        let ds = from_items(&items).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.shape(), [1, 28, 28]);

        let first = ds.get(0).unwrap();
        assert_eq!(first.label, 7);
        assert!((first.pixels[1] - 1.0).abs() < 1e-6);
        assert!((first.pixels[28 * 28 - 1] - 0.2).abs() < 1e-6);
    }
}
