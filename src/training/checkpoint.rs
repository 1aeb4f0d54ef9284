//! Model checkpointing
//!
//! This module provides:
//! - `best` and `last` model records (Burn `CompactRecorder`, `.mpk`)
//! - A JSON sidecar with the epoch, validation metrics and learning rate

use std::fs;
use std::path::{Path, PathBuf};

use burn::{module::Module, record::CompactRecorder, tensor::backend::Backend};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::utils::error::{LabError, Result};

pub const BEST_MODEL: &str = "best";
pub const LAST_MODEL: &str = "last";
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Training state written next to the model records after every epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub epoch: usize,
    pub val_accuracy: f64,
    pub val_loss: f64,
    pub val_f1: f64,
    pub best_accuracy: f64,
    pub best_loss: f64,
    pub learning_rate: f64,
    pub model: String,
    pub num_classes: usize,
    pub timestamp: String,
}

impl Checkpoint {
    /// Save checkpoint to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        debug!("Checkpoint saved to {:?}", path);
        Ok(())
    }

    /// Load checkpoint from file
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Current time for checkpoint metadata
pub fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

/// Writes model records into a run directory
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    run_dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(run_dir: PathBuf) -> Self {
        Self { run_dir }
    }

    /// Path of a model record, without the recorder's extension
    pub fn model_path(&self, name: &str) -> PathBuf {
        self.run_dir.join(name)
    }

    pub fn save_model<B: Backend, M: Module<B>>(&self, model: &M, name: &str) -> Result<()> {
        let path = self.model_path(name);
        model
            .clone()
            .save_file(&path, &CompactRecorder::new())
            .map_err(|e| LabError::Checkpoint(format!("Failed to save {:?}: {}", path, e)))?;
        debug!("Model saved to {:?}", path);
        Ok(())
    }

    pub fn save_best<B: Backend, M: Module<B>>(&self, model: &M) -> Result<()> {
        self.save_model(model, BEST_MODEL)
    }

    pub fn save_last<B: Backend, M: Module<B>>(&self, model: &M) -> Result<()> {
        self.save_model(model, LAST_MODEL)
    }

    /// Load a saved record into `model`
    pub fn load_model<B: Backend, M: Module<B>>(
        &self,
        model: M,
        name: &str,
        device: &B::Device,
    ) -> Result<M> {
        let path = self.model_path(name);
        model
            .load_file(&path, &CompactRecorder::new(), device)
            .map_err(|e| LabError::Checkpoint(format!("Failed to load {:?}: {}", path, e)))
    }

    pub fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        checkpoint.save(&self.run_dir.join(CHECKPOINT_FILE))
    }
}
