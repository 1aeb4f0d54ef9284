//! Dynamic loss scaling for reduced-precision training
//!
//! The loss is multiplied by a large factor before backpropagation so small
//! gradients stay representable, and the gradients are divided by the same
//! factor before the optimizer sees them. Steps whose gradients overflow are
//! skipped and the factor is halved; after a run of finite steps it doubles.

use std::marker::PhantomData;

use burn::{
    module::{AutodiffModule, ModuleVisitor, ParamId},
    optim::{GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, backend::Backend, ElementConversion, Tensor},
};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Numeric precision mode of the training loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[value(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// Dynamic loss scaling enabled
    Mixed,
    /// Plain single precision, no scaling
    Fp32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LossScaleConfig {
    pub initial_scale: f32,
    pub growth_factor: f32,
    pub backoff_factor: f32,
    pub growth_interval: usize,
    pub min_scale: f32,
}

impl Default for LossScaleConfig {
    fn default() -> Self {
        Self {
            initial_scale: 2f32.powi(16),
            growth_factor: 2.0,
            backoff_factor: 0.5,
            growth_interval: 2000,
            min_scale: 1.0,
        }
    }
}

/// Dynamic loss scaler
#[derive(Debug, Clone)]
pub struct GradScaler {
    enabled: bool,
    scale: f32,
    stable_steps: usize,
    skipped_steps: usize,
    config: LossScaleConfig,
}

impl GradScaler {
    pub fn new(precision: Precision) -> Self {
        Self::with_config(LossScaleConfig::default(), precision)
    }

    pub fn with_config(config: LossScaleConfig, precision: Precision) -> Self {
        let enabled = precision == Precision::Mixed;
        Self {
            enabled,
            scale: if enabled { config.initial_scale } else { 1.0 },
            stable_steps: 0,
            skipped_steps: 0,
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current loss scale (1 when disabled)
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Total optimizer steps skipped because of overflow
    pub fn skipped_steps(&self) -> usize {
        self.skipped_steps
    }

    pub fn scale_loss<B: Backend>(&self, loss: Tensor<B, 1>) -> Tensor<B, 1> {
        if self.enabled {
            loss.mul_scalar(self.scale)
        } else {
            loss
        }
    }

    /// Divide every gradient of `model` by the current scale
    ///
    /// Returns `true` if any gradient contains a non-finite value.
    pub fn unscale<B, M>(&self, model: &M, grads: &mut GradientsParams) -> bool
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
    {
        let mut unscaler = GradUnscaler::<B> {
            grads,
            inv_scale: 1.0 / self.scale,
            found_inf: false,
            _backend: PhantomData,
        };
        model.visit(&mut unscaler);
        unscaler.found_inf
    }

    /// Adjust the scale after a step
    pub fn update(&mut self, found_inf: bool) {
        if !self.enabled {
            return;
        }
        if found_inf {
            self.scale = (self.scale * self.config.backoff_factor).max(self.config.min_scale);
            self.stable_steps = 0;
            self.skipped_steps += 1;
        } else {
            self.stable_steps += 1;
            if self.stable_steps >= self.config.growth_interval {
                self.scale *= self.config.growth_factor;
                self.stable_steps = 0;
            }
        }
    }

    /// Scaled backward pass followed by a (possibly skipped) optimizer step
    ///
    /// Returns the updated model and whether the optimizer actually stepped.
    pub fn step<B, M, O>(
        &mut self,
        loss: Tensor<B, 1>,
        model: M,
        optimizer: &mut O,
        lr: f64,
    ) -> (M, bool)
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let grads = self.scale_loss(loss).backward();
        let mut grads = GradientsParams::from_grads(grads, &model);

        let found_inf = self.unscale(&model, &mut grads);
        self.update(found_inf);

        if found_inf && self.enabled {
            tracing::debug!("Non-finite gradients, skipping step (scale now {})", self.scale);
            return (model, false);
        }
        (optimizer.step(lr, model, grads), true)
    }
}

struct GradUnscaler<'a, B: AutodiffBackend> {
    grads: &'a mut GradientsParams,
    inv_scale: f32,
    found_inf: bool,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradUnscaler<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) else {
            return;
        };

        let grad = if self.inv_scale != 1.0 {
            grad.mul_scalar(self.inv_scale)
        } else {
            grad
        };

        if !self.found_inf {
            let total = grad.clone().sum().into_scalar().elem::<f32>();
            self.found_inf = !total.is_finite();
        }

        self.grads.register::<B::InnerBackend, D>(id, grad);
    }
}
