//! MNIST training and parameter export tool
//!
//! Subcommands:
//!
//! - `train`: fit a model on the MNIST IDX files and write its parameters
//! - `inspect`: summarize the blocks of a parameter file
//! - `evaluate`: load a parameter file into a model and score the test set
//!
//! Log verbosity is controlled with `RUST_LOG`.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use mnist_param_export::architecture::{build_model, load_architecture, ArchitectureConfig};
use mnist_param_export::config::{load_config, TrainingConfig};
use mnist_param_export::data::load_mnist;
use mnist_param_export::export::{import_model, read_parameters, ParameterExporter};
use mnist_param_export::model::Sequential;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::error::Error;
use std::path::PathBuf;
use std::time::Instant;

const DEFAULT_OUTPUT: &str = "FC_mnist_600x300x140_parameters.txt";

#[derive(Parser, Debug)]
#[command(name = "mnist_params", version, about = "Train MNIST classifiers and export their parameters")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a model and export its weights and biases
    Train(TrainArgs),

    /// Print the block structure of a parameter file
    Inspect(InspectArgs),

    /// Load exported parameters and report test loss and accuracy
    Evaluate(EvaluateArgs),
}

/// Model and training settings shared by `train` and `evaluate`.
#[derive(Args, Debug)]
struct ModelArgs {
    /// Architecture JSON file (default: 784-600-300-140-10 sigmoid network)
    #[arg(long)]
    architecture: Option<String>,

    /// Training configuration JSON file (default: built-in settings)
    #[arg(long)]
    config: Option<String>,

    /// Directory holding the four MNIST IDX files
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Use at most this many test samples
    #[arg(long)]
    test_limit: Option<usize>,
}

#[derive(Args, Debug)]
struct TrainArgs {
    #[command(flatten)]
    model: ModelArgs,

    /// Parameter file to write
    #[arg(long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Use at most this many training samples
    #[arg(long)]
    train_limit: Option<usize>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Parameter file to read
    file: PathBuf,
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    #[command(flatten)]
    model: ModelArgs,

    /// Parameter file to load
    #[arg(long, default_value = DEFAULT_OUTPUT)]
    params: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mnist_param_export=info".parse()?)
                .add_directive("mnist_params=info".parse()?),
        )
        .init();

    match Cli::parse().command {
        Commands::Train(args) => train(args),
        Commands::Inspect(args) => inspect(args),
        Commands::Evaluate(args) => evaluate(args),
    }
}

/// Config and architecture errors are not `Send`, so they are flattened to text.
fn config_error(what: &str, path: &str, err: Box<dyn Error>) -> anyhow::Error {
    anyhow!("failed to load {} {}: {}", what, path, err)
}

fn load_settings(args: &ModelArgs) -> Result<(ArchitectureConfig, TrainingConfig)> {
    let architecture = match &args.architecture {
        Some(path) => load_architecture(path).map_err(|e| config_error("architecture", path, e))?,
        None => ArchitectureConfig::default(),
    };
    let config = match &args.config {
        Some(path) => load_config(path).map_err(|e| config_error("training config", path, e))?,
        None => TrainingConfig::default(),
    };
    Ok((architecture, config))
}

fn build(architecture: &ArchitectureConfig, config: &TrainingConfig) -> Result<Sequential> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    build_model(architecture, &mut rng).map_err(|e| anyhow!("failed to build model: {}", e))
}

fn train(args: TrainArgs) -> Result<()> {
    let program_start = Instant::now();
    let (architecture, config) = load_settings(&args.model)?;
    let mut model = build(&architecture, &config)?;

    let data_dir = &args.model.data_dir;
    let train_set = load_mnist(data_dir, true, args.train_limit)
        .with_context(|| format!("failed to read training data from {}", data_dir.display()))?;
    let test_set = load_mnist(data_dir, false, args.model.test_limit)
        .with_context(|| format!("failed to read test data from {}", data_dir.display()))?;
    tracing::info!(train = train_set.len(), test = test_set.len(), "loaded MNIST");

    let reports = model
        .fit(&train_set, &config, Some(&test_set))
        .map_err(|e| anyhow!("training failed: {}", e))?;

    if let Some(val) = reports.last().and_then(|report| report.validation) {
        tracing::info!(loss = val.loss, accuracy = val.accuracy, "final test evaluation");
    }

    ParameterExporter::new(config.flatten_order)
        .export_to_file(&model, &args.output)
        .with_context(|| format!("failed to export parameters to {}", args.output.display()))?;

    tracing::info!(
        seconds = program_start.elapsed().as_secs_f32(),
        "done"
    );
    Ok(())
}

fn inspect(args: InspectArgs) -> Result<()> {
    let blocks = read_parameters(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    println!("{}: {} blocks", args.file.display(), blocks.len());
    for (i, block) in blocks.iter().enumerate() {
        let width = block
            .row_width()
            .map_or_else(|| "ragged".to_string(), |w| w.to_string());
        println!(
            "block {}: {} rows x {} values, {} biases",
            i,
            block.rows.len(),
            width,
            block.biases.len()
        );
    }
    Ok(())
}

fn evaluate(args: EvaluateArgs) -> Result<()> {
    let (architecture, config) = load_settings(&args.model)?;
    let mut model = build(&architecture, &config)?;

    import_model(&mut model, &args.params, config.flatten_order)
        .with_context(|| format!("failed to import {}", args.params.display()))?;

    let data_dir = &args.model.data_dir;
    let test_set = load_mnist(data_dir, false, args.model.test_limit)
        .with_context(|| format!("failed to read test data from {}", data_dir.display()))?;

    let evaluation = model
        .evaluate(&test_set, config.batch_size)
        .map_err(|e| anyhow!("evaluation failed: {}", e))?;

    println!(
        "test loss {:.6}, accuracy {:.2}%",
        evaluation.loss,
        evaluation.accuracy * 100.0
    );
    Ok(())
}
