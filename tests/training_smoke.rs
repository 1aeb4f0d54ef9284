//! End-to-end run on synthetic data with the CPU backend

use std::path::Path;

use burn::backend::{Autodiff, NdArray};
use tempfile::tempdir;

use classifier_lab::model::ModelKind;
use classifier_lab::training::checkpoint::Checkpoint;
use classifier_lab::training::{run_training, OptimizerKind, Precision, TrainConfig};
use classifier_lab::TensorDataset;

type TestBackend = Autodiff<NdArray>;

const SIDE: usize = 16;

/// Two easily separable classes: dark and bright single-channel images
fn synthetic_dataset(n: usize) -> TensorDataset {
    let item_len = SIDE * SIDE;
    let mut features = Vec::with_capacity(n * item_len);
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let label = i % 2;
        let base = if label == 0 { 0.2 } else { 0.8 };
        features.extend((0..item_len).map(|p| base + ((i * 7 + p) % 11) as f32 * 0.005));
        labels.push(label);
    }
    TensorDataset::new(features, labels, [1, SIDE, SIDE], 2).unwrap()
}

fn smoke_config(model_dir: &Path) -> TrainConfig {
    TrainConfig {
        epochs: 1,
        batch_size: 4,
        valid_batch_size: 4,
        log_interval: 2,
        lr: 1e-3,
        model: ModelKind::BaseModel,
        optimizer: OptimizerKind::Adam,
        precision: Precision::Mixed,
        model_dir: model_dir.to_path_buf(),
        log_timezone: "UTC".to_string(),
        num_workers: Some(4),
        ..TrainConfig::default()
    }
}

#[test]
fn test_training_run_layout() {
    let dir = tempdir().unwrap();
    let config = smoke_config(dir.path());
    let device = Default::default();

    // 40 samples, 5 folds: 32 train (8 batches of 4), 8 valid
    let summary = run_training::<TestBackend>(&config, synthetic_dataset(40), &device).unwrap();

    assert_eq!(summary.run_dir, dir.path().join("exp"));
    assert_eq!(summary.epochs, 1);
    assert!((0.0..=1.0).contains(&summary.best_val_accuracy));
    assert!(summary.best_val_loss.is_finite());

    for file in ["config.json", "log.txt", "best.mpk", "last.mpk", "checkpoint.json"] {
        assert!(summary.run_dir.join(file).exists(), "missing {}", file);
    }
    let has_events = std::fs::read_dir(&summary.run_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .any(|e| {
            e.file_name()
                .to_string_lossy()
                .starts_with("events.out.tfevents.")
        });
    assert!(has_events);

    let log = std::fs::read_to_string(summary.run_dir.join("log.txt")).unwrap();
    // One line every 2 of the 8 batches
    assert_eq!(log.matches("training loss").count(), 4);
    assert!(log.contains("Epoch[0/1](8/8)"));
    assert_eq!(log.matches("[Val] acc").count(), 1);

    let checkpoint = Checkpoint::load(&summary.run_dir.join("checkpoint.json")).unwrap();
    assert_eq!(checkpoint.epoch, 0);
    assert_eq!(checkpoint.num_classes, 2);
    assert_eq!(checkpoint.model, "BaseModel");
    assert!(checkpoint.val_loss.is_finite());
}

#[test]
fn test_checkpoint_records_epoch_learning_rate() {
    let dir = tempdir().unwrap();
    let config = TrainConfig {
        epochs: 2,
        lr_decay_step: 1,
        num_workers: Some(0),
        ..smoke_config(dir.path())
    };
    let device = Default::default();

    let summary = run_training::<TestBackend>(&config, synthetic_dataset(40), &device).unwrap();

    // Second epoch trains at half the initial rate; the scheduler has
    // already moved on to a quarter by the time the sidecar is written
    let checkpoint = Checkpoint::load(&summary.run_dir.join("checkpoint.json")).unwrap();
    assert_eq!(checkpoint.epoch, 1);
    assert!((checkpoint.learning_rate - 5e-4).abs() < 1e-12);

    let log = std::fs::read_to_string(summary.run_dir.join("log.txt")).unwrap();
    assert_eq!(log.matches("training loss").count(), 8);
    assert!(log.contains("lr 0.0005"));
}

#[test]
fn test_best_model_is_rescored() {
    let dir = tempdir().unwrap();
    let config = TrainConfig {
        epochs: 3,
        lr: 1e-2,
        ..smoke_config(dir.path())
    };
    let device = Default::default();

    let summary = run_training::<TestBackend>(&config, synthetic_dataset(40), &device).unwrap();

    let log = std::fs::read_to_string(summary.run_dir.join("log.txt")).unwrap();
    match &summary.best_model_metrics {
        Some(metrics) => {
            // Records are stored at half precision, so only the shape of the report is fixed
            assert_eq!(metrics.total_samples, 8);
            assert_eq!(metrics.confusion_matrix.total(), 8);
            assert!(log.contains("Best model on fold 0"));
            assert!(log.contains("Confusion Matrix"));
        }
        None => {
            assert_eq!(summary.best_val_accuracy, 0.0);
            assert!(!summary.run_dir.join("best.mpk").exists());
        }
    }
}

#[test]
fn test_second_run_gets_new_directory() {
    let dir = tempdir().unwrap();
    let config = TrainConfig {
        model: ModelKind::ConvNet,
        optimizer: OptimizerKind::Sgd,
        precision: Precision::Fp32,
        ..smoke_config(dir.path())
    };
    let device = Default::default();

    let first = run_training::<TestBackend>(&config, synthetic_dataset(40), &device).unwrap();
    let second = run_training::<TestBackend>(&config, synthetic_dataset(40), &device).unwrap();

    assert_eq!(first.run_dir, dir.path().join("exp"));
    assert_eq!(second.run_dir, dir.path().join("exp2"));
    assert!(second.run_dir.join("last.mpk").exists());
}
