//! Stratified k-fold splitting
//!
//! Indices of each class are shuffled with a seeded RNG and dealt round-robin
//! across the folds. The fold cursor carries over from one class to the next,
//! so fold sizes differ by at most one and every class is spread as evenly as
//! its size allows.
//!
//! This split is deterministic and reproducible using a fixed random seed.

use std::collections::BTreeMap;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::utils::error::{LabError, Result};

/// One train/validation partition of the dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub train: Vec<usize>,
    pub valid: Vec<usize>,
}

/// Stratified k-fold splitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StratifiedKFold {
    pub n_splits: usize,
    pub seed: u64,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize, seed: u64) -> Self {
        Self { n_splits, seed }
    }

    /// Splitter whose validation fold holds roughly `val_ratio` of the data
    ///
    /// `n_splits = round(1 / val_ratio)`, never fewer than 2.
    pub fn for_ratio(val_ratio: f64, seed: u64) -> Result<Self> {
        Ok(Self::new(folds_for_ratio(val_ratio)?, seed))
    }

    /// Assign every index to exactly one validation fold
    ///
    /// Fold `k` validates on the indices dealt to it and trains on the rest.
    /// Both lists are sorted ascending.
    pub fn split(&self, labels: &[usize]) -> Result<Vec<Fold>> {
        if self.n_splits < 2 {
            return Err(LabError::Config(format!(
                "n_splits must be at least 2, got {}",
                self.n_splits
            )));
        }
        if self.n_splits > labels.len() {
            return Err(LabError::Dataset(format!(
                "Cannot split {} samples into {} folds",
                labels.len(),
                self.n_splits
            )));
        }

        let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (idx, &label) in labels.iter().enumerate() {
            by_class.entry(label).or_default().push(idx);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut fold_of = vec![0usize; labels.len()];
        let mut cursor = 0usize;

        for (class, mut members) in by_class {
            if members.len() < self.n_splits {
                tracing::warn!(
                    "Class {} has only {} samples, fewer than {} folds",
                    class,
                    members.len(),
                    self.n_splits
                );
            }

            members.shuffle(&mut rng);
            for idx in members {
                fold_of[idx] = cursor;
                cursor = (cursor + 1) % self.n_splits;
            }
        }

        let folds = (0..self.n_splits)
            .map(|k| {
                let (valid, train): (Vec<usize>, Vec<usize>) =
                    (0..labels.len()).partition(|&idx| fold_of[idx] == k);
                Fold { train, valid }
            })
            .collect();

        Ok(folds)
    }
}

/// Number of folds giving a validation share of about `val_ratio`
pub fn folds_for_ratio(val_ratio: f64) -> Result<usize> {
    if !(val_ratio > 0.0 && val_ratio < 1.0) {
        return Err(LabError::Config(format!(
            "val_ratio must lie in (0, 1), got {}",
            val_ratio
        )));
    }
    Ok(((1.0 / val_ratio).round() as usize).max(2))
}
