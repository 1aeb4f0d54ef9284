//! Loss functions selectable by name

use burn::{
    nn::loss::CrossEntropyLossConfig,
    prelude::*,
    tensor::activation::{log_softmax, softmax},
};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Smoothing factor used by `label_smoothing`
pub const LABEL_SMOOTHING: f32 = 0.1;
/// Focusing parameter used by `focal`
pub const FOCAL_GAMMA: f64 = 2.0;

const F1_EPSILON: f64 = 1e-7;

/// Training criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[value(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    CrossEntropy,
    LabelSmoothing,
    Focal,
    F1,
}

impl Criterion {
    /// Mean loss over the batch as a single-element tensor
    pub fn loss<B: Backend>(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let device = logits.device();
        match self {
            Criterion::CrossEntropy => CrossEntropyLossConfig::new()
                .init(&device)
                .forward(logits, targets),
            Criterion::LabelSmoothing => CrossEntropyLossConfig::new()
                .with_smoothing(Some(LABEL_SMOOTHING))
                .init(&device)
                .forward(logits, targets),
            Criterion::Focal => focal_loss(logits, targets, FOCAL_GAMMA),
            Criterion::F1 => f1_loss(logits, targets),
        }
    }
}

impl std::fmt::Display for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Criterion::CrossEntropy => "cross_entropy",
            Criterion::LabelSmoothing => "label_smoothing",
            Criterion::Focal => "focal",
            Criterion::F1 => "f1",
        };
        write!(f, "{}", name)
    }
}

/// `-(1 - p_t)^gamma * log(p_t)`, averaged over the batch
fn focal_loss<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>, gamma: f64) -> Tensor<B, 1> {
    let [batch_size, _] = logits.dims();
    let log_probs = log_softmax(logits, 1);
    let log_pt = log_probs.gather(1, targets.reshape([batch_size, 1]));
    let pt = log_pt.clone().exp();

    let weight = pt.neg().add_scalar(1.0).powf_scalar(gamma);
    (weight * log_pt).neg().mean()
}

/// `1 - macro F1` computed from softmax probabilities
fn f1_loss<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    let [batch_size, num_classes] = logits.dims();
    let device = logits.device();

    let probs = softmax(logits, 1);
    let one_hot = one_hot(targets, batch_size, num_classes, &device);

    // Soft confusion counts per class, shape [1, num_classes]
    let tp = (probs.clone() * one_hot.clone()).sum_dim(0);
    let fp = (probs.clone() * one_hot.clone().neg().add_scalar(1.0)).sum_dim(0);
    let fn_ = (probs.neg().add_scalar(1.0) * one_hot).sum_dim(0);

    let precision = tp.clone() / (tp.clone() + fp).add_scalar(F1_EPSILON);
    let recall = tp.clone() / (tp + fn_).add_scalar(F1_EPSILON);
    let f1 = (precision.clone() * recall.clone()).mul_scalar(2.0)
        / (precision + recall).add_scalar(F1_EPSILON);

    f1.mean().neg().add_scalar(1.0)
}

fn one_hot<B: Backend>(
    targets: Tensor<B, 1, Int>,
    batch_size: usize,
    num_classes: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    Tensor::<B, 2>::zeros([batch_size, num_classes], device).scatter(
        1,
        targets.reshape([batch_size, 1]),
        Tensor::<B, 2>::ones([batch_size, 1], device),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{ElementConversion, TensorData};

    type TestBackend = NdArray;

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_scalar().elem::<f32>()
    }

    fn targets(values: Vec<i64>) -> Tensor<TestBackend, 1, Int> {
        let n = values.len();
        Tensor::from_data(TensorData::new(values, [n]), &Default::default())
    }

    #[test]
    fn test_uniform_logits_cross_entropy() {
        let logits = Tensor::<TestBackend, 2>::zeros([4, 5], &Default::default());
        let loss = scalar(Criterion::CrossEntropy.loss(logits, targets(vec![0, 1, 2, 3])));
        assert!((loss - 5f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_focal_below_cross_entropy() {
        let logits = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![2.0f32, 0.5, -1.0, 0.1, 0.2, 0.3], [2, 3]),
            &Default::default(),
        );
        let t = targets(vec![0, 2]);
        let ce = scalar(Criterion::CrossEntropy.loss(logits.clone(), t.clone()));
        let focal = scalar(Criterion::Focal.loss(logits, t));
        assert!(focal > 0.0);
        assert!(focal < ce);
    }

    #[test]
    fn test_label_smoothing_penalizes_confidence() {
        let logits = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![20.0f32, 0.0, 0.0, 0.0, 20.0, 0.0], [2, 3]),
            &Default::default(),
        );
        let t = targets(vec![0, 1]);
        let ce = scalar(Criterion::CrossEntropy.loss(logits.clone(), t.clone()));
        let smoothed = scalar(Criterion::LabelSmoothing.loss(logits, t));
        assert!(ce < 1e-3);
        assert!(smoothed > ce);
    }

    #[test]
    fn test_f1_loss_bounds() {
        let confident = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![30.0f32, 0.0, 0.0, 30.0], [2, 2]),
            &Default::default(),
        );
        let good = scalar(Criterion::F1.loss(confident.clone(), targets(vec![0, 1])));
        let bad = scalar(Criterion::F1.loss(confident, targets(vec![1, 0])));
        assert!(good < 1e-3);
        assert!(bad > 0.99);
    }

    #[test]
    fn test_names() {
        assert_eq!(Criterion::CrossEntropy.to_string(), "cross_entropy");
        assert_eq!(
            Criterion::from_str("label_smoothing", false).unwrap(),
            Criterion::LabelSmoothing
        );
    }
}
