//! Neural network models for image classification
//!
//! Models are selected by name on the command line and share the
//! [`ImageClassifier`] interface, so the training loop is generic over them.

pub mod base;
pub mod convnet;

use burn::{module::Module, tensor::backend::Backend, tensor::Tensor};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub use base::BaseModel;
pub use convnet::ConvNet;

/// A network mapping `[N, C, H, W]` images to `[N, num_classes]` logits
pub trait ImageClassifier<B: Backend>: Module<B> {
    /// Build a freshly initialized model
    fn build(in_channels: usize, num_classes: usize, device: &B::Device) -> Self
    where
        Self: Sized;

    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;
}

/// Model architecture selected by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum ModelKind {
    #[value(name = "BaseModel")]
    #[serde(rename = "BaseModel")]
    BaseModel,
    #[value(name = "ConvNet")]
    #[serde(rename = "ConvNet")]
    ConvNet,
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKind::BaseModel => write!(f, "BaseModel"),
            ModelKind::ConvNet => write!(f, "ConvNet"),
        }
    }
}
