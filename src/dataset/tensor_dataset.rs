//! In-memory labeled image dataset
//!
//! All images share one `[C, H, W]` shape and live in a single flattened
//! feature buffer, indexed alongside a label vector.

use std::sync::Arc;

use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::utils::error::{LabError, Result};

/// A single image and its class label
#[derive(Debug, Clone, PartialEq)]
pub struct ImageItem {
    /// CHW pixels
    pub pixels: Vec<f32>,
    pub label: usize,
}

/// Per-channel mean and standard deviation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

impl ChannelStats {
    /// Identity normalization for `channels` channels
    pub fn identity(channels: usize) -> Self {
        Self {
            mean: vec![0.0; channels],
            std: vec![1.0; channels],
        }
    }
}

/// Features, labels and class count for a labeled image collection
///
/// Cloning is cheap: the feature buffer is shared, only the index view is
/// copied.
#[derive(Debug, Clone)]
pub struct TensorDataset {
    features: Arc<Vec<f32>>,
    labels: Arc<Vec<usize>>,
    /// Rows of `features`/`labels` visible through this view
    indices: Vec<usize>,
    shape: [usize; 3],
    num_classes: usize,
}

impl TensorDataset {
    /// Build a dataset from a flattened `N x C x H x W` buffer
    pub fn new(
        features: Vec<f32>,
        labels: Vec<usize>,
        shape: [usize; 3],
        num_classes: usize,
    ) -> Result<Self> {
        let item_len: usize = shape.iter().product();
        if item_len == 0 {
            return Err(LabError::Dataset(format!("Invalid item shape {:?}", shape)));
        }
        if features.len() != labels.len() * item_len {
            return Err(LabError::Dataset(format!(
                "Feature buffer holds {} values but {} labels of shape {:?} need {}",
                features.len(),
                labels.len(),
                shape,
                labels.len() * item_len
            )));
        }
        if let Some(&bad) = labels.iter().find(|&&l| l >= num_classes) {
            return Err(LabError::Dataset(format!(
                "Label {} out of range for {} classes",
                bad, num_classes
            )));
        }

        let indices = (0..labels.len()).collect();
        Ok(Self {
            features: Arc::new(features),
            labels: Arc::new(labels),
            indices,
            shape,
            num_classes,
        })
    }

    /// Item shape `[C, H, W]`
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn channels(&self) -> usize {
        self.shape[0]
    }

    /// Labels in view order
    pub fn labels(&self) -> Vec<usize> {
        self.indices.iter().map(|&i| self.labels[i]).collect()
    }

    /// A view over the given positions of this dataset
    pub fn subset(&self, positions: &[usize]) -> Result<TensorDataset> {
        let indices = positions
            .iter()
            .map(|&p| {
                self.indices.get(p).copied().ok_or_else(|| {
                    LabError::Dataset(format!(
                        "Subset index {} out of range for {} items",
                        p,
                        self.indices.len()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            features: Arc::clone(&self.features),
            labels: Arc::clone(&self.labels),
            indices,
            shape: self.shape,
            num_classes: self.num_classes,
        })
    }

    /// Number of items per class
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_classes];
        for &i in &self.indices {
            counts[self.labels[i]] += 1;
        }
        counts
    }

    /// Per-channel mean and population standard deviation
    ///
    /// Standard deviations are clamped to at least `1e-6` so normalization
    /// never divides by zero.
    pub fn channel_stats(&self) -> ChannelStats {
        let [channels, height, width] = self.shape;
        let plane = height * width;
        let count = (self.indices.len() * plane) as f64;
        if count == 0.0 {
            return ChannelStats::identity(channels);
        }

        let mut sum = vec![0.0f64; channels];
        let mut sum_sq = vec![0.0f64; channels];
        for pixels in self.indices.iter().map(|&i| self.row(i)) {
            for c in 0..channels {
                for &v in &pixels[c * plane..(c + 1) * plane] {
                    let v = v as f64;
                    sum[c] += v;
                    sum_sq[c] += v * v;
                }
            }
        }

        let mean: Vec<f64> = sum.iter().map(|s| s / count).collect();
        let std = sum_sq
            .iter()
            .zip(&mean)
            .map(|(sq, m)| ((sq / count - m * m).max(0.0).sqrt() as f32).max(1e-6))
            .collect();

        ChannelStats {
            mean: mean.into_iter().map(|m| m as f32).collect(),
            std,
        }
    }

    fn row(&self, index: usize) -> &[f32] {
        let item_len = self.shape.iter().product::<usize>();
        &self.features[index * item_len..(index + 1) * item_len]
    }
}

impl Dataset<ImageItem> for TensorDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        let row = *self.indices.get(index)?;
        Some(ImageItem {
            pixels: self.row(row).to_vec(),
            label: self.labels[row],
        })
    }

    fn len(&self) -> usize {
        self.indices.len()
    }
}
