//! Optimizers selectable by name
//!
//! Every optimizer applies the same L2 weight decay. Each constructor returns
//! a concrete Burn optimizer, so the training loop stays statically
//! dispatched over the optimizer type.

use burn::{
    module::AutodiffModule,
    optim::{decay::WeightDecayConfig, AdamConfig, AdamWConfig, Optimizer, SgdConfig},
    tensor::backend::AutodiffBackend,
};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Weight decay shared by all optimizers
pub const WEIGHT_DECAY: f32 = 5e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum OptimizerKind {
    #[value(name = "Adam")]
    Adam,
    #[value(name = "SGD")]
    #[serde(rename = "SGD")]
    Sgd,
    #[value(name = "AdamW")]
    AdamW,
}

impl std::fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptimizerKind::Adam => write!(f, "Adam"),
            OptimizerKind::Sgd => write!(f, "SGD"),
            OptimizerKind::AdamW => write!(f, "AdamW"),
        }
    }
}

pub fn adam<B, M>() -> impl Optimizer<M, B>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    AdamConfig::new()
        .with_weight_decay(Some(WeightDecayConfig::new(WEIGHT_DECAY)))
        .init::<B, M>()
}

pub fn sgd<B, M>() -> impl Optimizer<M, B>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    SgdConfig::new()
        .with_weight_decay(Some(WeightDecayConfig::new(WEIGHT_DECAY)))
        .init::<B, M>()
}

/// AdamW applies decoupled weight decay
pub fn adamw<B, M>() -> impl Optimizer<M, B>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    AdamWConfig::new()
        .with_weight_decay(WEIGHT_DECAY)
        .init::<B, M>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{Autodiff, NdArray},
        nn::{Linear, LinearConfig},
        optim::GradientsParams,
        tensor::{ElementConversion, Tensor},
    };

    type TestBackend = Autodiff<NdArray>;

    fn one_step<O: Optimizer<Linear<TestBackend>, TestBackend>>(mut optim: O) -> f32 {
        let device = Default::default();
        let model: Linear<TestBackend> = LinearConfig::new(3, 1).init(&device);
        let before = model.weight.val().sum().into_scalar().elem::<f32>();

        let x = Tensor::<TestBackend, 2>::ones([2, 3], &device);
        let loss = model.forward(x).sum();
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        let model = optim.step(0.1, model, grads);

        let after = model.weight.val().sum().into_scalar().elem::<f32>();
        after - before
    }

    #[test]
    fn test_every_optimizer_moves_weights_downhill() {
        // d(loss)/d(w) is positive, so every optimizer must decrease the weights
        assert!(one_step(adam::<TestBackend, Linear<TestBackend>>()) < 0.0);
        assert!(one_step(sgd::<TestBackend, Linear<TestBackend>>()) < 0.0);
        assert!(one_step(adamw::<TestBackend, Linear<TestBackend>>()) < 0.0);
    }

    #[test]
    fn test_names() {
        assert_eq!(OptimizerKind::from_str("SGD", false).unwrap(), OptimizerKind::Sgd);
        assert_eq!(OptimizerKind::AdamW.to_string(), "AdamW");
    }
}
