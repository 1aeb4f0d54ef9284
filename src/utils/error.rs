//! Error Handling Module
//!
//! Defines the error type shared by the library side of the harness.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for classifier-lab operations
#[derive(Error, Debug)]
pub enum LabError {
    /// Error loading or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error with dataset construction or splitting
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Invalid run configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error saving or loading a model record
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Error writing the TensorBoard event file
    #[error("Summary writer error: {0}")]
    Summary(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl From<serde_json::Error> for LabError {
    fn from(err: serde_json::Error) -> Self {
        LabError::Serialization(err.to_string())
    }
}

/// Convenience Result type for classifier-lab operations
pub type Result<T> = std::result::Result<T, LabError>;
