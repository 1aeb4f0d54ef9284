//! Training loop orchestration
//!
//! Splits the dataset into a stratified train/validation fold, versions a run
//! directory, then alternates training epochs (scaled backward, optimizer
//! step, periodic logging) with validation passes (loss, accuracy, macro F1,
//! checkpoint selection). The best record is reloaded and scored once more
//! at the end of the run.
//!
//! Loaders iterate over [`BatchChunks`], so every epoch sees exactly
//! `len / batch_size` full batches whatever the worker count.
//!
//! Model and optimizer are chosen by name and dispatched statically, so the
//! loop itself is generic over both.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use burn::{
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    module::AutodiffModule,
    optim::Optimizer,
    prelude::*,
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::{
    Augmenter, BatchChunks, ChannelStats, ImageBatch, ImageBatcher, ImageItem, Normalizer,
    StratifiedKFold, TensorDataset,
};
use crate::model::{BaseModel, ConvNet, ImageClassifier, ModelKind};
use crate::training::checkpoint::{timestamp, Checkpoint, CheckpointManager, BEST_MODEL};
use crate::training::config::TrainConfig;
use crate::training::criterion::Criterion;
use crate::training::optimizer::{adam, adamw, sgd, OptimizerKind};
use crate::training::scaler::GradScaler;
use crate::training::scheduler::{StepLr, DEFAULT_GAMMA};
use crate::training::tracker::{BestTracker, IntervalStats};
use crate::utils::error::{LabError, Result};
use crate::utils::logging::{parse_timezone, RunLog};
use crate::utils::metrics::Metrics;
use crate::utils::run_dir::increment_path;
use crate::utils::summary::{encode_grid, SummaryWriter};
use crate::utils::format_duration;

/// Validation images rendered into the `results` image summary
const FIGURE_IMAGES: usize = 16;
const FIGURE_COLUMNS: usize = 4;

/// Outcome of a completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_dir: PathBuf,
    pub epochs: usize,
    pub best_val_accuracy: f64,
    pub best_val_loss: f64,
    pub last_val_f1: f64,
    pub skipped_steps: usize,
    /// Validation fold scored with the reloaded `best` record
    pub best_model_metrics: Option<Metrics>,
}

/// Result of one validation pass
#[derive(Debug, Clone)]
struct Validation {
    /// Mean of per-batch mean losses, NaN when no batch ran
    loss: f64,
    metrics: Metrics,
    samples: usize,
    figure: Option<Vec<Vec<f32>>>,
}

impl Validation {
    fn accuracy(&self) -> f64 {
        self.metrics.accuracy
    }

    fn f1(&self) -> f64 {
        self.metrics.macro_f1
    }
}

/// Everything a run needs besides the model and optimizer
struct RunContext<B: AutodiffBackend> {
    config: TrainConfig,
    device: B::Device,
    run_dir: PathBuf,
    log: RunLog,
    writer: SummaryWriter,
    checkpoints: CheckpointManager,
    train_set: TensorDataset,
    valid_set: TensorDataset,
    normalizer: Normalizer,
    valid_batch_size: usize,
    num_workers: usize,
}

/// Train a model on `dataset` as described by `config`
///
/// The configuration is validated and the fold is computed before the run
/// directory is created, so invalid input leaves no trace on disk.
pub fn run_training<B: AutodiffBackend>(
    config: &TrainConfig,
    dataset: TensorDataset,
    device: &B::Device,
) -> Result<RunSummary> {
    config.validate()?;
    let timezone = parse_timezone(&config.log_timezone)?;

    let folds = StratifiedKFold::for_ratio(config.val_ratio, config.seed)?.split(&dataset.labels())?;
    let fold = folds.get(config.fold).ok_or_else(|| {
        LabError::Config(format!("fold {} out of range for {} folds", config.fold, folds.len()))
    })?;
    let train_set = dataset.subset(&fold.train)?;
    let valid_set = dataset.subset(&fold.valid)?;

    if train_set.len() < config.batch_size {
        return Err(LabError::Dataset(format!(
            "Not enough training data ({}) for batch size {}",
            train_set.len(),
            config.batch_size
        )));
    }
    let valid_batch_size = if valid_set.len() < config.valid_batch_size {
        tracing::warn!(
            "Validation fold has {} samples, lowering valid batch size from {}",
            valid_set.len(),
            config.valid_batch_size
        );
        valid_set.len()
    } else {
        config.valid_batch_size
    };

    let run_dir = increment_path(config.run_root())?;
    config.save(&run_dir.join("config.json"))?;
    let log = RunLog::new(&run_dir, timezone);
    let writer = SummaryWriter::create(&run_dir)?;

    log.log(&format!("Run directory: {}", run_dir.display()))?;
    log.log(&format!(
        "Fold {} of {}: {} training / {} validation samples, {} classes",
        config.fold,
        folds.len(),
        train_set.len(),
        valid_set.len(),
        dataset.num_classes()
    ))?;

    let normalizer = Normalizer::new(train_set.channel_stats());
    log_channel_stats(&log, normalizer.stats())?;

    B::seed(config.seed);

    let ctx = RunContext::<B> {
        config: config.clone(),
        device: device.clone(),
        checkpoints: CheckpointManager::new(run_dir.clone()),
        run_dir,
        log,
        writer,
        train_set,
        valid_set,
        normalizer,
        valid_batch_size,
        num_workers: config.num_workers.unwrap_or_else(default_num_workers),
    };

    match config.model {
        ModelKind::BaseModel => train_model::<B, BaseModel<B>>(ctx),
        ModelKind::ConvNet => train_model::<B, ConvNet<B>>(ctx),
    }
}

fn train_model<B, M>(ctx: RunContext<B>) -> Result<RunSummary>
where
    B: AutodiffBackend,
    M: ImageClassifier<B> + AutodiffModule<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
{
    let model = M::build(
        ctx.train_set.channels(),
        ctx.train_set.num_classes(),
        &ctx.device,
    );

    match ctx.config.optimizer {
        OptimizerKind::Adam => fit(ctx, model, adam::<B, M>()),
        OptimizerKind::Sgd => fit(ctx, model, sgd::<B, M>()),
        OptimizerKind::AdamW => fit(ctx, model, adamw::<B, M>()),
    }
}

fn fit<B, M, O>(mut ctx: RunContext<B>, mut model: M, mut optimizer: O) -> Result<RunSummary>
where
    B: AutodiffBackend,
    M: ImageClassifier<B> + AutodiffModule<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    let config = ctx.config.clone();
    let shape = ctx.train_set.shape();
    let num_classes = ctx.train_set.num_classes();

    let train_batcher = ImageBatcher::<B>::new(ctx.device.clone(), shape, ctx.normalizer.clone())
        .with_augmenter(Augmenter::from_kind(config.augmentation), config.seed);
    let valid_batcher =
        ImageBatcher::<B::InnerBackend>::new(ctx.device.clone(), shape, ctx.normalizer.clone());

    let valid_chunks = BatchChunks::sequential(ctx.valid_set.clone(), ctx.valid_batch_size);
    let valid_loader = chunk_loader(valid_batcher, valid_chunks, ctx.num_workers);
    let mut shuffle_rng = ChaCha8Rng::seed_from_u64(config.seed);

    let criterion = config.criterion;
    let mut scheduler = StepLr::new(config.lr, config.lr_decay_step, DEFAULT_GAMMA);
    let mut scaler = GradScaler::new(config.precision);

    ctx.log.log(&format!(
        "Training {} with {} (lr {}, {} precision, {} workers)",
        config.model, config.optimizer, config.lr, precision_name(&scaler), ctx.num_workers
    ))?;

    let started = Instant::now();
    let mut best = BestTracker::new();
    let mut best_saved = false;
    let mut last_f1 = 0.0f64;
    let mut interval = IntervalStats::new(config.log_interval, config.batch_size);

    for epoch in 0..config.epochs {
        let lr = scheduler.lr();

        // Fresh global permutation each epoch, cut into full batches
        let train_chunks =
            BatchChunks::shuffled(ctx.train_set.clone(), config.batch_size, &mut shuffle_rng);
        let n_train_batches = train_chunks.len();
        let train_loader = chunk_loader(train_batcher.clone(), train_chunks, ctx.num_workers);
        interval.reset();

        for (idx, batch) in train_loader.iter().enumerate() {
            let logits = model.forward(batch.images);
            let preds = logits.clone().argmax(1).squeeze::<1>(1);
            let loss = criterion.loss(logits, batch.targets.clone());

            let loss_value = loss.clone().into_scalar().elem::<f64>();
            let matches = preds
                .equal(batch.targets)
                .int()
                .sum()
                .into_scalar()
                .elem::<i64>() as usize;

            let (updated, _) = scaler.step(loss, model, &mut optimizer, lr);
            model = updated;

            if let Some(report) = interval.push(loss_value, matches) {
                ctx.log.log(&format!(
                    "Epoch[{}/{}]({}/{}) || training loss {:4.4} || training accuracy {:4.2}% || lr {}",
                    epoch,
                    config.epochs,
                    idx + 1,
                    n_train_batches,
                    report.loss,
                    report.accuracy * 100.0,
                    lr
                ))?;

                let step = (epoch * n_train_batches + idx) as i64;
                ctx.writer.add_scalar("Train/loss", report.loss, step)?;
                ctx.writer.add_scalar("Train/accuracy", report.accuracy, step)?;
            }
        }

        scheduler.step();

        tracing::info!("Calculating validation results...");
        let model_valid = model.valid();
        let val = validate(
            &model_valid,
            valid_loader.as_ref(),
            criterion,
            &ctx.normalizer,
            num_classes,
        );
        tracing::debug!("Validated {} samples", val.samples);

        if best.observe(val.accuracy(), val.loss) {
            ctx.log.log(&format!(
                "New best model for val accuracy : {:4.2}%! saving the best model..",
                val.accuracy() * 100.0
            ))?;
            ctx.checkpoints.save_best::<B::InnerBackend, _>(&model_valid)?;
            best_saved = true;
        }
        ctx.checkpoints.save_last::<B::InnerBackend, _>(&model_valid)?;
        last_f1 = val.f1();

        ctx.log.log(&format!(
            "[Val] acc : {:4.2}%, loss: {:4.2} || best acc : {:4.2}%, best loss: {:4.2}, f1 score: {:4.2}",
            val.accuracy() * 100.0,
            val.loss,
            best.accuracy() * 100.0,
            best.loss(),
            val.f1()
        ))?;

        let step = epoch as i64;
        ctx.writer.add_scalar("Val/loss", val.loss, step)?;
        ctx.writer.add_scalar("Val/accuracy", val.accuracy(), step)?;
        ctx.writer.add_scalar("Val/f1", val.f1(), step)?;
        if let Some(images) = &val.figure {
            let grid = encode_grid(images, shape, FIGURE_COLUMNS)?;
            ctx.writer.add_image("results", grid, step)?;
        }

        ctx.checkpoints.save_checkpoint(&Checkpoint {
            epoch,
            val_accuracy: val.accuracy(),
            val_loss: val.loss,
            val_f1: val.f1(),
            best_accuracy: best.accuracy(),
            best_loss: best.loss(),
            learning_rate: lr,
            model: config.model.to_string(),
            num_classes,
            timestamp: timestamp(),
        })?;
    }

    if scaler.skipped_steps() > 0 {
        tracing::warn!(
            "{} optimizer steps skipped on gradient overflow (final scale {})",
            scaler.skipped_steps(),
            scaler.scale()
        );
    }
    ctx.log.log(&format!(
        "Training finished in {} | best acc {:4.2}% | best loss {:4.2}",
        format_duration(started.elapsed().as_secs_f64()),
        best.accuracy() * 100.0,
        best.loss()
    ))?;

    let best_model_metrics = if best_saved {
        let fresh = <M::InnerModule as ImageClassifier<B::InnerBackend>>::build(
            shape[0],
            num_classes,
            &ctx.device,
        );
        let best_model = ctx
            .checkpoints
            .load_model::<B::InnerBackend, _>(fresh, BEST_MODEL, &ctx.device)?;
        let val = validate(
            &best_model,
            valid_loader.as_ref(),
            criterion,
            &ctx.normalizer,
            num_classes,
        );
        ctx.log.log(&format!(
            "Best model on fold {}:\n{}\n{}",
            config.fold, val.metrics, val.metrics.confusion_matrix
        ))?;
        Some(val.metrics)
    } else {
        None
    };

    Ok(RunSummary {
        run_dir: ctx.run_dir,
        epochs: config.epochs,
        best_val_accuracy: best.accuracy(),
        best_val_loss: best.loss(),
        last_val_f1: last_f1,
        skipped_steps: scaler.skipped_steps(),
        best_model_metrics,
    })
}

/// One loader item per full batch
fn chunk_loader<B: Backend>(
    batcher: ImageBatcher<B>,
    chunks: BatchChunks,
    num_workers: usize,
) -> Arc<dyn DataLoader<ImageBatch<B>>> {
    let builder = DataLoaderBuilder::<Vec<ImageItem>, ImageBatch<B>>::new(batcher).batch_size(1);
    if num_workers > 0 {
        builder.num_workers(num_workers).build(chunks)
    } else {
        builder.build(chunks)
    }
}

fn validate<B, M>(
    model: &M,
    loader: &dyn DataLoader<ImageBatch<B>>,
    criterion: Criterion,
    normalizer: &Normalizer,
    num_classes: usize,
) -> Validation
where
    B: Backend,
    M: ImageClassifier<B>,
{
    let mut loss_sum = 0.0f64;
    let mut n_batches = 0usize;
    let mut labels: Vec<usize> = Vec::new();
    let mut preds: Vec<usize> = Vec::new();
    let mut figure = None;

    for batch in loader.iter() {
        if figure.is_none() {
            figure = Some(figure_images(&batch.images, normalizer));
        }

        let logits = model.forward(batch.images);
        let batch_preds = logits.clone().argmax(1).squeeze::<1>(1);

        loss_sum += criterion
            .loss(logits, batch.targets.clone())
            .into_scalar()
            .elem::<f64>();

        labels.extend(batch.targets.into_data().iter::<i64>().map(|v| v as usize));
        preds.extend(batch_preds.into_data().iter::<i64>().map(|v| v as usize));
        n_batches += 1;
    }

    Validation {
        loss: if n_batches > 0 { loss_sum / n_batches as f64 } else { f64::NAN },
        samples: labels.len(),
        metrics: Metrics::from_predictions(&preds, &labels, num_classes),
        figure,
    }
}

/// Up to 16 denormalized CHW images from the head of a batch
fn figure_images<B: Backend>(images: &Tensor<B, 4>, normalizer: &Normalizer) -> Vec<Vec<f32>> {
    let [batch_size, channels, height, width] = images.dims();
    let n = batch_size.min(FIGURE_IMAGES);
    let item_len = channels * height * width;

    let values: Vec<f32> = images
        .clone()
        .slice([0..n])
        .into_data()
        .iter::<f32>()
        .collect();

    values
        .chunks(item_len)
        .map(|chunk| {
            let mut pixels = chunk.to_vec();
            normalizer.denormalize(&mut pixels);
            pixels
        })
        .collect()
}

fn log_channel_stats(log: &RunLog, stats: &ChannelStats) -> Result<()> {
    let fmt = |v: &[f32]| {
        v.iter()
            .map(|x| format!("{:.4}", x))
            .collect::<Vec<_>>()
            .join(", ")
    };
    log.log(&format!(
        "Normalization mean [{}] std [{}]",
        fmt(&stats.mean),
        fmt(&stats.std)
    ))
}

fn precision_name(scaler: &GradScaler) -> &'static str {
    if scaler.is_enabled() {
        "mixed"
    } else {
        "fp32"
    }
}

/// Half the available CPUs, at least one
pub fn default_num_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() / 2)
        .unwrap_or(1)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    fn two_class_dataset(n: usize, shape: [usize; 3]) -> TensorDataset {
        let item_len: usize = shape.iter().product();
        let labels: Vec<usize> = (0..n).map(|i| i % 2).collect();
        let features: Vec<f32> = (0..n * item_len)
            .map(|p| if (p / item_len) % 2 == 0 { 0.25 } else { 0.75 })
            .collect();
        TensorDataset::new(features, labels, shape, 2).unwrap()
    }

    #[test]
    fn test_default_num_workers() {
        assert!(default_num_workers() >= 1);
    }

    #[test]
    fn test_multi_worker_loader_yields_full_batches() {
        let dataset = two_class_dataset(103, [1, 2, 2]);
        let normalizer = Normalizer::new(dataset.channel_stats());
        let batcher = ImageBatcher::<TestBackend>::new(Default::default(), [1, 2, 2], normalizer);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let chunks = BatchChunks::shuffled(dataset, 10, &mut rng);

        let loader = chunk_loader(batcher, chunks, 4);
        let sizes: Vec<usize> = loader.iter().map(|b| b.targets.dims()[0]).collect();
        assert_eq!(sizes, vec![10; 10]);
    }

    #[test]
    fn test_validation_sees_whole_fold_with_workers() {
        let dataset = two_class_dataset(200, [1, 16, 16]);
        let folds = StratifiedKFold::for_ratio(0.2, 42)
            .unwrap()
            .split(&dataset.labels())
            .unwrap();
        let valid_set = dataset.subset(&folds[0].valid).unwrap();
        assert_eq!(valid_set.len(), 40);

        let device = Default::default();
        let normalizer = Normalizer::new(dataset.channel_stats());
        let batcher = ImageBatcher::<TestBackend>::new(device, [1, 16, 16], normalizer.clone());
        let loader = chunk_loader(batcher, BatchChunks::sequential(valid_set, 8), 4);

        let model = BaseModel::<TestBackend>::build(1, 2, &Default::default());
        let val = validate(&model, loader.as_ref(), Criterion::CrossEntropy, &normalizer, 2);

        assert_eq!(val.samples, 40);
        assert_eq!(val.metrics.total_samples, 40);
        assert!(val.loss.is_finite());
        assert!(val.figure.is_some());
    }

    #[test]
    fn test_invalid_config_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainConfig {
            epochs: 0,
            model_dir: dir.path().join("model"),
            ..TrainConfig::default()
        };
        let dataset = TensorDataset::new(vec![0.0; 8], vec![0, 1], [1, 2, 2], 2).unwrap();

        let result = run_training::<burn::backend::Autodiff<burn::backend::NdArray>>(
            &config,
            dataset,
            &Default::default(),
        );
        assert!(matches!(result, Err(LabError::Config(_))));
        assert!(!dir.path().join("model").exists());
    }

    #[test]
    fn test_too_little_training_data() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainConfig {
            batch_size: 64,
            model_dir: dir.path().join("model"),
            ..TrainConfig::default()
        };
        let labels: Vec<usize> = (0..20).map(|i| i % 2).collect();
        let dataset = TensorDataset::new(vec![0.5; 20 * 4], labels, [1, 2, 2], 2).unwrap();

        let result = run_training::<burn::backend::Autodiff<burn::backend::NdArray>>(
            &config,
            dataset,
            &Default::default(),
        );
        assert!(matches!(result, Err(LabError::Dataset(_))));
        assert!(!dir.path().join("model").exists());
    }
}
