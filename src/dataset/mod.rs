//! Dataset module for loading, splitting and batching labeled images
//!
//! This module provides functionality for:
//! - Loading a class-per-directory image folder or MNIST into memory
//! - Stratified k-fold train/validation splitting
//! - Data augmentation and normalization
//! - Burn batching for the training and validation loaders

pub mod augmentation;
pub mod batcher;
pub mod chunked;
pub mod image_folder;
pub mod mnist;
pub mod split;
pub mod tensor_dataset;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

// Re-export main types for convenience
pub use augmentation::{AugmentationKind, Augmenter, Normalizer};
pub use batcher::{ImageBatch, ImageBatcher};
pub use chunked::BatchChunks;
pub use image_folder::ImageFolder;
pub use mnist::MnistSplit;
pub use split::{Fold, StratifiedKFold};
pub use tensor_dataset::{ChannelStats, ImageItem, TensorDataset};

use crate::utils::error::Result;

/// Dataset source selected by name on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum DatasetKind {
    /// `data_dir/{class}/*.jpg` resized to the requested size
    #[value(name = "ImageFolder")]
    #[serde(rename = "ImageFolder")]
    ImageFolder,
    /// Burn's MNIST training split (resize ignored)
    #[value(name = "MNIST")]
    #[serde(rename = "MNIST")]
    Mnist,
    /// Burn's MNIST test split (resize ignored)
    #[value(name = "MNISTTest")]
    #[serde(rename = "MNISTTest")]
    MnistTest,
}

impl DatasetKind {
    /// Load the selected source into memory
    ///
    /// `resize` is `[height, width]` and only applies to image folders.
    pub fn load(&self, data_dir: &std::path::Path, resize: [usize; 2]) -> Result<TensorDataset> {
        match self {
            DatasetKind::ImageFolder => ImageFolder::scan(data_dir)?.load(resize[0], resize[1]),
            DatasetKind::Mnist => mnist::load_mnist(MnistSplit::Train),
            DatasetKind::MnistTest => mnist::load_mnist(MnistSplit::Test),
        }
    }
}
