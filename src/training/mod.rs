//! Training module
//!
//! This module provides:
//! - The run configuration (CLI flags, `config.json` snapshot)
//! - Loss functions and optimizer selection
//! - Step learning rate decay and dynamic loss scaling
//! - Model records and the per-epoch checkpoint sidecar
//! - The epoch loop tying it all together

pub mod checkpoint;
pub mod config;
pub mod criterion;
pub mod optimizer;
pub mod scaler;
pub mod scheduler;
pub mod tracker;
pub mod trainer;

// Re-export main types for convenience
pub use checkpoint::{Checkpoint, CheckpointManager};
pub use config::TrainConfig;
pub use criterion::Criterion;
pub use optimizer::OptimizerKind;
pub use scaler::{GradScaler, Precision};
pub use scheduler::StepLr;
pub use tracker::{BestTracker, IntervalStats};
pub use trainer::{run_training, RunSummary};
