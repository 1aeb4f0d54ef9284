//! Data Augmentation Module
//!
//! Random pixel-level transforms applied to training batches, plus the
//! per-channel normalization shared by training and validation.
//!
//! # Augmentation Strategy
//!
//! - **Training**: Apply random augmentations, then normalize
//! - **Validation**: Normalize only (clean evaluation)
//!
//! All transforms operate on CHW `f32` buffers with values in `[0, 1]`,
//! i.e. before normalization.

use clap::ValueEnum;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::tensor_dataset::ChannelStats;

/// Augmentation selected by name on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum AugmentationKind {
    /// No random transform, normalization only
    #[value(name = "BaseAugmentation")]
    #[serde(rename = "BaseAugmentation")]
    Base,
    /// Flip, brightness, contrast and noise jitter
    #[value(name = "CustomAugmentation")]
    #[serde(rename = "CustomAugmentation")]
    Custom,
}

impl AugmentationKind {
    pub fn config(&self) -> AugmentationConfig {
        match self {
            AugmentationKind::Base => AugmentationConfig::none(),
            AugmentationKind::Custom => AugmentationConfig::default(),
        }
    }
}

/// Configuration for data augmentation
#[derive(Clone, Debug, PartialEq)]
pub struct AugmentationConfig {
    /// Probability of applying horizontal flip (0.0 - 1.0)
    pub horizontal_flip_prob: f32,
    /// Brightness adjustment range (±brightness_delta)
    pub brightness_delta: f32,
    /// Probability of applying brightness adjustment
    pub brightness_prob: f32,
    /// Contrast adjustment range (1.0 ± contrast_delta)
    pub contrast_delta: f32,
    /// Probability of applying contrast adjustment
    pub contrast_prob: f32,
    /// Gaussian noise standard deviation (0.0 = disabled)
    pub noise_std: f32,
    /// Probability of applying noise
    pub noise_prob: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            horizontal_flip_prob: 0.5,
            brightness_delta: 0.2,
            brightness_prob: 0.5,
            contrast_delta: 0.2,
            contrast_prob: 0.5,
            noise_std: 0.02,
            noise_prob: 0.1,
        }
    }
}

impl AugmentationConfig {
    /// No augmentation at all
    pub fn none() -> Self {
        Self {
            horizontal_flip_prob: 0.0,
            brightness_delta: 0.0,
            brightness_prob: 0.0,
            contrast_delta: 0.0,
            contrast_prob: 0.0,
            noise_std: 0.0,
            noise_prob: 0.0,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.horizontal_flip_prob <= 0.0
            && self.brightness_prob <= 0.0
            && self.contrast_prob <= 0.0
            && self.noise_prob <= 0.0
    }
}

/// Applies random augmentations to CHW images
#[derive(Clone, Debug)]
pub struct Augmenter {
    config: AugmentationConfig,
}

impl Augmenter {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    pub fn from_kind(kind: AugmentationKind) -> Self {
        Self::new(kind.config())
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Apply all configured augmentations randomly, in place
    pub fn augment(&self, pixels: &mut [f32], shape: [usize; 3], rng: &mut ChaCha8Rng) {
        if rng.gen::<f32>() < self.config.horizontal_flip_prob {
            flip_horizontal(pixels, shape);
        }

        if self.config.brightness_prob > 0.0 && rng.gen::<f32>() < self.config.brightness_prob {
            let delta = rng.gen_range(-self.config.brightness_delta..=self.config.brightness_delta);
            pixels.iter_mut().for_each(|v| *v = (*v + delta).clamp(0.0, 1.0));
        }

        if self.config.contrast_prob > 0.0 && rng.gen::<f32>() < self.config.contrast_prob {
            let factor =
                1.0 + rng.gen_range(-self.config.contrast_delta..=self.config.contrast_delta);
            adjust_contrast(pixels, factor);
        }

        if self.config.noise_std > 0.0 && rng.gen::<f32>() < self.config.noise_prob {
            let std = self.config.noise_std;
            for v in pixels.iter_mut() {
                // Box-Muller transform for Gaussian noise
                let u1: f32 = 1.0 - rng.gen::<f32>();
                let u2: f32 = rng.gen();
                let noise = std * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos();
                *v = (*v + noise).clamp(0.0, 1.0);
            }
        }
    }
}

fn flip_horizontal(pixels: &mut [f32], shape: [usize; 3]) {
    let [channels, height, width] = shape;
    for c in 0..channels {
        for y in 0..height {
            let start = (c * height + y) * width;
            pixels[start..start + width].reverse();
        }
    }
}

/// Scale pixel values around the image mean
fn adjust_contrast(pixels: &mut [f32], factor: f32) {
    if pixels.is_empty() {
        return;
    }
    let mean = pixels.iter().sum::<f32>() / pixels.len() as f32;
    pixels
        .iter_mut()
        .for_each(|v| *v = (mean + factor * (*v - mean)).clamp(0.0, 1.0));
}

/// Per-channel `(x - mean) / std` normalization and its inverse
#[derive(Clone, Debug, PartialEq)]
pub struct Normalizer {
    stats: ChannelStats,
}

impl Normalizer {
    pub fn new(stats: ChannelStats) -> Self {
        Self { stats }
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    /// Normalize a CHW image in place
    pub fn normalize(&self, pixels: &mut [f32]) {
        let plane = pixels.len() / self.stats.mean.len().max(1);
        for (c, chunk) in pixels.chunks_mut(plane.max(1)).enumerate() {
            let (mean, std) = (self.stats.mean[c], self.stats.std[c]);
            chunk.iter_mut().for_each(|v| *v = (*v - mean) / std);
        }
    }

    /// Map a normalized CHW image back to pixel space
    pub fn denormalize(&self, pixels: &mut [f32]) {
        let plane = pixels.len() / self.stats.mean.len().max(1);
        for (c, chunk) in pixels.chunks_mut(plane.max(1)).enumerate() {
            let (mean, std) = (self.stats.mean[c], self.stats.std[c]);
            chunk.iter_mut().for_each(|v| *v = *v * std + mean);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn gradient(shape: [usize; 3]) -> Vec<f32> {
        let len: usize = shape.iter().product();
        (0..len).map(|i| i as f32 / len as f32).collect()
    }

    #[test]
    fn test_base_augmentation_is_identity() {
        let augmenter = Augmenter::from_kind(AugmentationKind::Base);
        assert!(augmenter.config().is_identity());

        let shape = [3, 4, 4];
        let original = gradient(shape);
        let mut pixels = original.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        for _ in 0..10 {
            augmenter.augment(&mut pixels, shape, &mut rng);
        }
        assert_eq!(pixels, original);
    }

    #[test]
    fn test_custom_augmentation_stays_in_range() {
        let augmenter = Augmenter::from_kind(AugmentationKind::Custom);
        let shape = [3, 8, 8];
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let mut changed = false;
        for _ in 0..20 {
            let original = gradient(shape);
            let mut pixels = original.clone();
            augmenter.augment(&mut pixels, shape, &mut rng);
            assert!(pixels.iter().all(|v| (0.0..=1.0).contains(v)));
            changed |= pixels != original;
        }
        assert!(changed);
    }

    #[test]
    fn test_flip_horizontal() {
        let mut pixels = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        flip_horizontal(&mut pixels, [1, 2, 3]);
        assert_eq!(pixels, vec![3.0, 2.0, 1.0, 6.0, 5.0, 4.0]);
    }

    #[test]
    fn test_contrast_keeps_mean() {
        let mut pixels = vec![0.2, 0.4, 0.6, 0.8];
        adjust_contrast(&mut pixels, 0.5);
        let mean = pixels.iter().sum::<f32>() / 4.0;
        assert!((mean - 0.5).abs() < 1e-6);
        assert!((pixels[0] - 0.35).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_roundtrip() {
        let stats = ChannelStats {
            mean: vec![0.5, 0.25],
            std: vec![0.5, 0.25],
        };
        let normalizer = Normalizer::new(stats);
        let original = vec![0.0, 1.0, 0.25, 0.5];
        let mut pixels = original.clone();

        normalizer.normalize(&mut pixels);
        assert_eq!(pixels, vec![-1.0, 1.0, 0.0, 1.0]);

        normalizer.denormalize(&mut pixels);
        for (a, b) in pixels.iter().zip(&original) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
