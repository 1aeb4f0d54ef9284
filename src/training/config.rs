//! Training run configuration
//!
//! Parsed from the command line (with environment fallbacks for the data,
//! model and user locations) and snapshotted to `config.json` in the run
//! directory.

use std::path::{Path, PathBuf};

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::dataset::split::folds_for_ratio;
use crate::dataset::{AugmentationKind, DatasetKind};
use crate::model::ModelKind;
use crate::training::criterion::Criterion;
use crate::training::optimizer::OptimizerKind;
use crate::training::scaler::Precision;
use crate::utils::error::{LabError, Result};
use crate::utils::logging::parse_timezone;

#[derive(Args, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Random seed
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Number of epochs to train
    #[arg(long, default_value_t = 5)]
    pub epochs: usize,

    /// Dataset source
    #[arg(long, value_enum, default_value_t = DatasetKind::ImageFolder)]
    pub dataset: DatasetKind,

    /// Training-time augmentation
    #[arg(long, value_enum, default_value_t = AugmentationKind::Base)]
    pub augmentation: AugmentationKind,

    /// Resize images to HEIGHT WIDTH
    #[arg(long, num_args = 2, value_names = ["HEIGHT", "WIDTH"], default_values_t = [512, 384])]
    pub resize: Vec<usize>,

    /// Training batch size
    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    /// Validation batch size
    #[arg(long, default_value_t = 1000)]
    pub valid_batch_size: usize,

    /// Model architecture
    #[arg(long, value_enum, default_value_t = ModelKind::BaseModel)]
    pub model: ModelKind,

    /// Optimizer
    #[arg(long, value_enum, default_value_t = OptimizerKind::Adam)]
    pub optimizer: OptimizerKind,

    /// Initial learning rate
    #[arg(long, default_value_t = 3e-5)]
    pub lr: f64,

    /// Share of the data used for validation
    #[arg(long, default_value_t = 0.2)]
    pub val_ratio: f64,

    /// Which stratified fold to validate on
    #[arg(long, default_value_t = 0)]
    pub fold: usize,

    /// Loss function
    #[arg(long, value_enum, default_value_t = Criterion::CrossEntropy)]
    pub criterion: Criterion,

    /// Halve the learning rate every N epochs
    #[arg(long, default_value_t = 5)]
    pub lr_decay_step: usize,

    /// Batches between training log lines
    #[arg(long, default_value_t = 20)]
    pub log_interval: usize,

    /// Run name; an existing name gets a numeric suffix
    #[arg(long, default_value = "exp")]
    pub name: String,

    /// Loss scaling mode
    #[arg(long, value_enum, default_value_t = Precision::Mixed)]
    pub precision: Precision,

    /// Training images
    #[arg(long, env = "SM_CHANNEL_TRAIN", default_value = "/opt/ml/input/data/train/images")]
    pub data_dir: PathBuf,

    /// Where runs are stored, below ./lab/{my_name}
    #[arg(long, env = "SM_MODEL_DIR", default_value = "./model")]
    pub model_dir: PathBuf,

    /// Owner of the run
    #[arg(long, env = "MYNAME", default_value = "anonymous")]
    pub my_name: String,

    /// Timezone for log.txt timestamps
    #[arg(long, default_value = "Asia/Seoul")]
    pub log_timezone: String,

    /// Data loader worker threads; 0 loads on the training thread
    /// (default: half the CPUs)
    #[arg(long)]
    #[serde(default)]
    pub num_workers: Option<usize>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            epochs: 5,
            dataset: DatasetKind::ImageFolder,
            augmentation: AugmentationKind::Base,
            resize: vec![512, 384],
            batch_size: 64,
            valid_batch_size: 1000,
            model: ModelKind::BaseModel,
            optimizer: OptimizerKind::Adam,
            lr: 3e-5,
            val_ratio: 0.2,
            fold: 0,
            criterion: Criterion::CrossEntropy,
            lr_decay_step: 5,
            log_interval: 20,
            name: "exp".to_string(),
            precision: Precision::Mixed,
            data_dir: PathBuf::from("/opt/ml/input/data/train/images"),
            model_dir: PathBuf::from("./model"),
            my_name: "anonymous".to_string(),
            log_timezone: "Asia/Seoul".to_string(),
            num_workers: None,
        }
    }
}

impl TrainConfig {
    /// Check every field before anything touches the filesystem
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(LabError::Config("epochs must be at least 1".to_string()));
        }
        if self.batch_size == 0 || self.valid_batch_size == 0 {
            return Err(LabError::Config("batch sizes must be at least 1".to_string()));
        }
        if self.log_interval == 0 {
            return Err(LabError::Config("log_interval must be at least 1".to_string()));
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(LabError::Config(format!("lr must be positive, got {}", self.lr)));
        }
        if self.lr_decay_step == 0 {
            return Err(LabError::Config("lr_decay_step must be at least 1".to_string()));
        }
        if self.resize.len() != 2 || self.resize.iter().any(|&v| v == 0) {
            return Err(LabError::Config(format!(
                "resize needs two positive values, got {:?}",
                self.resize
            )));
        }
        if self.name.is_empty() || self.name.contains(['/', '\\']) {
            return Err(LabError::Config(format!("invalid run name '{}'", self.name)));
        }

        let n_splits = folds_for_ratio(self.val_ratio)?;
        if self.fold >= n_splits {
            return Err(LabError::Config(format!(
                "fold {} out of range for {} folds",
                self.fold, n_splits
            )));
        }

        parse_timezone(&self.log_timezone)?;
        Ok(())
    }

    /// `[height, width]`
    pub fn resize_hw(&self) -> [usize; 2] {
        match self.resize.as_slice() {
            [h, w] => [*h, *w],
            _ => [512, 384],
        }
    }

    /// `./lab/{my_name}/{model_dir}/{name}` before versioning
    pub fn run_root(&self) -> PathBuf {
        crate::utils::run_dir::run_root(&self.my_name, &self.model_dir, &self.name)
    }

    /// Write the configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
