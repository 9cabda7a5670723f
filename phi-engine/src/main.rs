//! phi-engine - fusion and balance command-line entry point
//!
//! Loads the pipeline configuration once at startup, then either validates
//! it, runs the fusion pipeline over externally computed stage scores, or
//! aggregates category metrics. Results are printed as JSON.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use phi_common::config::{resolve_config, LoggingConfig, TomlConfig};
use phi_engine::{
    BalanceAggregator, FusionOrchestrator, MetricInput, RecordedScoreStage, Stage, StageRegistry,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for phi-engine
#[derive(Parser, Debug)]
#[command(name = "phi-engine")]
#[command(about = "Multi-stage result fusion and category balance engine")]
#[command(version)]
struct Args {
    /// Configuration file (TOML); falls back to $PHI_CONFIG, then the platform config dir
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration and print the stage execution order
    Check,

    /// Run the fusion pipeline over pre-computed stage scores
    Run {
        /// JSON input: {"scores": {"<stage>": 0.0..1.0}, "payloads": {...}}
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Aggregate category metrics into a balance score
    Balance {
        /// JSON array of {"category", "raw_value", "weight"?}
        #[arg(short, long)]
        metrics: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = resolve_config(args.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.logging)?;

    info!("Starting phi-engine");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Check => check(&config),
        Command::Run { input } => run(&config, &input).await,
        Command::Balance { metrics } => balance(&config, &metrics),
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("phi_engine={0},phi_common={0}", logging.level)));

    let (file_layer, stderr_layer) = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (Some(layer), None)
        }
        None => (
            None,
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(())
}

/// Bind a [`RecordedScoreStage`] to every configured stage
fn recorded_registry(config: &TomlConfig) -> StageRegistry {
    config
        .stages
        .iter()
        .map(|spec| {
            let stage: Arc<dyn Stage> = Arc::new(RecordedScoreStage::new(&spec.name));
            (spec.name.clone(), stage)
        })
        .collect()
}

fn build_orchestrator(config: &TomlConfig) -> Result<FusionOrchestrator> {
    FusionOrchestrator::new(config.stages.clone(), recorded_registry(config), config.scoring)
        .context("Invalid pipeline configuration")
}

fn check(config: &TomlConfig) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    BalanceAggregator::new(config.balance).context("Invalid balance configuration")?;

    println!("Configuration OK");
    println!("Execution order: {}", orchestrator.execution_order().join(" -> "));
    println!(
        "Bands: hold >= {}, accept >= {}",
        config.scoring.hold, config.scoring.accept
    );
    Ok(())
}

async fn run(config: &TomlConfig, input_path: &Path) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;

    let content = std::fs::read_to_string(input_path)
        .with_context(|| format!("Failed to read input {}", input_path.display()))?;
    let input: serde_json::Value =
        serde_json::from_str(&content).context("Input is not valid JSON")?;

    let result = orchestrator.run_pipeline(input).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn balance(config: &TomlConfig, metrics_path: &Path) -> Result<()> {
    let aggregator = BalanceAggregator::new(config.balance).context("Invalid balance configuration")?;

    let content = std::fs::read_to_string(metrics_path)
        .with_context(|| format!("Failed to read metrics {}", metrics_path.display()))?;
    let inputs: Vec<MetricInput> =
        serde_json::from_str(&content).context("Metrics file is not a valid metric array")?;

    let metrics = aggregator.resolve_metrics(&inputs);

    let result = aggregator.aggregate(&metrics).context("Balance aggregation failed")?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
