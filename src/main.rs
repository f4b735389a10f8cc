use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use addrlabel::config::AppConfig;
use addrlabel::engine::LabelingEngine;
use addrlabel::metrics::init_metrics;
use addrlabel::pipeline::run_once;
use addrlabel::sinks::{ConfiguredSink, LabelSink};
use addrlabel::sources::{ConfiguredSource, SnapshotWindow, StatisticsSource};

#[derive(Parser)]
#[command(name = "addrlabel")]
#[command(about = "Behavioral labels for blockchain addresses")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch statistics, label every address and persist the result
    Run {
        /// Snapshot time (RFC 3339); defaults to now
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,

        /// Overrides EVAL_WORKERS
        #[arg(long)]
        workers: Option<usize>,

        /// Number of labels to print as a sample after the run
        #[arg(long, default_value_t = 10)]
        sample: usize,
    },
    /// Check configuration, source and sink without writing anything
    Validate,
    /// Print the active rules with their thresholds
    Rules,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("invalid configuration")?;

    match cli.command {
        Command::Run { as_of, workers, sample } => run(&config, as_of, workers, sample).await,
        Command::Validate => validate(&config).await,
        Command::Rules => rules(&config),
    }
}

async fn run(
    config: &AppConfig,
    as_of: Option<DateTime<Utc>>,
    workers: Option<usize>,
    sample: usize,
) -> anyhow::Result<()> {
    let metrics_handle = init_metrics();

    let engine = LabelingEngine::with_default_evaluators(config.thresholds.clone())?;
    let source = ConfiguredSource::from_location(config.statistics_location()?);
    let sink = ConfiguredSink::connect(config).await?;

    let run_time = as_of.unwrap_or_else(Utc::now);
    let window = SnapshotWindow::ending_at(run_time, config.snapshot_lookback_days);
    let workers = workers.unwrap_or(config.eval_workers).max(1);

    tracing::info!(sink = sink.name(), run_time = %run_time, "Starting labeling run");

    let output = run_once(&source, &sink, &engine, window, run_time, workers).await?;

    for label in output.labels.iter().take(sample) {
        tracing::info!(label = %label, "Sample label");
    }

    if let Some(path) = &config.metrics_path {
        tokio::fs::write(path, metrics_handle.render())
            .await
            .with_context(|| format!("writing metrics to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Metrics written");
    }

    Ok(())
}

async fn validate(config: &AppConfig) -> anyhow::Result<()> {
    LabelingEngine::with_default_evaluators(config.thresholds.clone())?;
    tracing::info!("Thresholds valid");

    let source = ConfiguredSource::from_location(config.statistics_location()?);
    source.check().await.context("statistics source unreachable")?;
    tracing::info!("Statistics source reachable");

    let sink = ConfiguredSink::connect(config).await?;
    sink.check().await.context("label sink unreadable")?;
    tracing::info!(sink = sink.name(), "Label sink readable");

    tracing::info!("Setup valid");
    Ok(())
}

fn rules(config: &AppConfig) -> anyhow::Result<()> {
    let engine = LabelingEngine::with_default_evaluators(config.thresholds.clone())?;
    let descriptions = engine.describe_rules();
    println!("{}", serde_json::to_string_pretty(&descriptions)?);
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
