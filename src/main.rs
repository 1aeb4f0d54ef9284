//! classifier-lab CLI
//!
//! Entry point for training runs and dataset inspection.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use classifier_lab::backend::{backend_name, default_device, TrainingBackend};
use classifier_lab::dataset::{DatasetKind, ImageFolder, StratifiedKFold};
use classifier_lab::training::{run_training, TrainConfig};
use classifier_lab::utils::format_duration;
use classifier_lab::utils::logging::{init_logging, LogConfig};

/// Image classification training harness
///
/// Trains a CNN on one stratified fold of a labeled image set and records
/// the run (config, log, TensorBoard events, model records) under
/// ./lab/{my_name}/{model_dir}/{name}.
#[derive(Parser, Debug)]
#[command(name = "classifier-lab")]
#[command(version)]
#[command(about = "Image classification training with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a model and record the run
    Train {
        #[command(flatten)]
        config: TrainConfig,
    },

    /// Show dataset statistics and fold sizes
    Stats {
        /// Path to the dataset directory
        #[arg(long, env = "SM_CHANNEL_TRAIN", default_value = "/opt/ml/input/data/train/images")]
        data_dir: PathBuf,

        /// Dataset source
        #[arg(long, value_enum, default_value_t = DatasetKind::ImageFolder)]
        dataset: DatasetKind,

        /// Resize images to HEIGHT WIDTH
        #[arg(long, num_args = 2, value_names = ["HEIGHT", "WIDTH"], default_values_t = [512, 384])]
        resize: Vec<usize>,

        /// Share of the data used for validation
        #[arg(long, default_value_t = 0.2)]
        val_ratio: f64,

        /// Random seed for the fold assignment
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn main() -> Result<()> {
    // Environment fallbacks for the train flags come from .env
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Train { config } => cmd_train(config)?,
        Commands::Stats {
            data_dir,
            dataset,
            resize,
            val_ratio,
            seed,
        } => cmd_stats(&data_dir, dataset, &resize, val_ratio, seed)?,
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════╗
 ║   classifier-lab                                         ║
 ║   Image classification training with Burn + Rust         ║
 ╚══════════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn cmd_train(config: TrainConfig) -> Result<()> {
    config.validate().context("Invalid training configuration")?;

    println!("{} {}", "Backend:".cyan(), backend_name());
    println!("{} {}", "Model:".cyan(), config.model);
    println!("{} {:?}", "Data:".cyan(), config.data_dir);

    let start = std::time::Instant::now();
    let data = config
        .dataset
        .load(&config.data_dir, config.resize_hw())
        .with_context(|| format!("Failed to load dataset from {:?}", config.data_dir))?;
    info!(
        "Loaded {} images in {}",
        data.class_counts().iter().sum::<usize>(),
        format_duration(start.elapsed().as_secs_f64())
    );

    let device = default_device();
    let summary = run_training::<TrainingBackend>(&config, data, &device)
        .context("Training run failed")?;

    println!();
    println!("{}", "Training complete".green().bold());
    println!("  Run directory:       {:?}", summary.run_dir);
    println!("  Epochs:              {}", summary.epochs);
    println!(
        "  Best val accuracy:   {:.2}%",
        summary.best_val_accuracy * 100.0
    );
    println!("  Best val loss:       {:.4}", summary.best_val_loss);
    println!("  Last val F1:         {:.4}", summary.last_val_f1);
    if let Some(metrics) = &summary.best_model_metrics {
        println!();
        println!("{}", "Best model on the validation fold".cyan());
        println!("{}", metrics);
        print!("{}", metrics.confusion_matrix);
    }
    if summary.skipped_steps > 0 {
        println!(
            "  {} {} optimizer steps skipped on overflow",
            "Note:".yellow(),
            summary.skipped_steps
        );
    }

    Ok(())
}

fn cmd_stats(
    data_dir: &Path,
    dataset: DatasetKind,
    resize: &[usize],
    val_ratio: f64,
    seed: u64,
) -> Result<()> {
    let resize = match resize {
        [h, w] if *h > 0 && *w > 0 => [*h, *w],
        _ => anyhow::bail!("--resize needs two positive values, got {:?}", resize),
    };

    info!("Computing dataset statistics for: {:?}", data_dir);

    let class_names = match dataset {
        DatasetKind::ImageFolder => ImageFolder::scan(data_dir)
            .with_context(|| format!("Failed to scan {:?}", data_dir))?
            .classes,
        DatasetKind::Mnist | DatasetKind::MnistTest => (0..10).map(|d| d.to_string()).collect(),
    };

    let data = dataset
        .load(data_dir, resize)
        .with_context(|| format!("Failed to load dataset from {:?}", data_dir))?;

    let counts = data.class_counts();
    let total: usize = counts.iter().sum();
    let [c, h, w] = data.shape();

    println!();
    println!("{}", "Dataset Statistics".green().bold());
    println!("  Images:   {}", total);
    println!("  Shape:    {} x {} x {}", c, h, w);
    println!("  Classes:  {}", data.num_classes());
    println!();
    println!("{}", "Class distribution:".cyan());
    for (label, count) in counts.iter().enumerate() {
        let name = class_names
            .get(label)
            .map(String::as_str)
            .unwrap_or("?");
        let share = if total > 0 {
            *count as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        println!("  {:>3} {:<32} {:>7} ({:5.2}%)", label, name, count, share);
    }

    let stats = data.channel_stats();
    println!();
    println!("{}", "Channel statistics:".cyan());
    for (channel, (mean, std)) in stats.mean.iter().zip(&stats.std).enumerate() {
        println!("  channel {}: mean {:.4}, std {:.4}", channel, mean, std);
    }

    let splitter = StratifiedKFold::for_ratio(val_ratio, seed)?;
    let folds = splitter
        .split(&data.labels())
        .context("Failed to compute stratified folds")?;
    println!();
    println!(
        "{} ({} folds, seed {})",
        "Fold sizes:".cyan(),
        splitter.n_splits,
        seed
    );
    for (k, fold) in folds.iter().enumerate() {
        println!(
            "  fold {}: train {:>7}, valid {:>7}",
            k,
            fold.train.len(),
            fold.valid.len()
        );
    }

    Ok(())
}
