//! # classifier-lab
//!
//! An image classification training harness built on the Burn framework.
//!
//! A run loads a labeled image set, holds out one stratified fold for
//! validation, trains a small CNN and records everything under a versioned
//! run directory: the configuration snapshot, a timestamped text log, a
//! TensorBoard event file, and the best and last model records.
//!
//! ## Modules
//!
//! - `dataset`: Image folder and MNIST loading, stratified folds, augmentation and batching
//! - `model`: The CNN architectures selectable by name
//! - `training`: Configuration, losses, optimizers, loss scaling and the epoch loop
//! - `utils`: Logging, metrics, summaries and run directories
//! - `backend`: Burn backend selected by Cargo features
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use classifier_lab::backend::{default_device, TrainingBackend};
//! use classifier_lab::training::{run_training, TrainConfig};
//!
//! let config = TrainConfig::default();
//! let data = config.dataset.load(&config.data_dir, config.resize_hw())?;
//! let summary = run_training::<TrainingBackend>(&config, data, &default_device())?;
//! ```

pub mod backend;
pub mod dataset;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{DatasetKind, ImageFolder, StratifiedKFold, TensorDataset};
pub use model::{BaseModel, ConvNet, ImageClassifier, ModelKind};
pub use training::{run_training, RunSummary, TrainConfig};
pub use utils::error::{LabError, Result};
pub use utils::metrics::{ConfusionMatrix, Metrics};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
