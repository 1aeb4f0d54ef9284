//! Learning Rate Scheduler Module
//!
//! Step decay: the learning rate is multiplied by `gamma` every `step_size`
//! epochs.

use serde::{Deserialize, Serialize};

/// Decay factor applied every `step_size` epochs
pub const DEFAULT_GAMMA: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepLr {
    initial_lr: f64,
    step_size: usize,
    gamma: f64,
    /// Number of completed `step()` calls
    epoch: usize,
}

impl StepLr {
    pub fn new(initial_lr: f64, step_size: usize, gamma: f64) -> Self {
        Self {
            initial_lr,
            step_size: step_size.max(1),
            gamma,
            epoch: 0,
        }
    }

    /// Learning rate at a given epoch: `initial_lr * gamma^(epoch / step_size)`
    pub fn lr_at(&self, epoch: usize) -> f64 {
        let decays = (epoch / self.step_size) as i32;
        self.initial_lr * self.gamma.powi(decays)
    }

    /// Current learning rate
    pub fn lr(&self) -> f64 {
        self.lr_at(self.epoch)
    }

    /// Advance one epoch
    pub fn step(&mut self) {
        self.epoch += 1;
    }
}
