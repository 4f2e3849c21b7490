//! sluice: a concurrent record pipeline.
//!
//! Reads records from files and HTTP endpoints, runs them through a chain
//! of transformers, and delivers them to every configured destination, with
//! checkpoint-based restart recovery.

use clap::Parser;
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use sluice::config::{Config, DestinationConfig, SourceConfig};
use sluice::error::{AddressParseSnafu, ConfigSnafu, MetricsSnafu, PipelineError};
use sluice::{metrics, run_pipeline};

/// Concurrent record pipeline.
#[derive(Parser, Debug)]
#[command(name = "sluice")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Dry run - validate configuration without processing.
    #[arg(long)]
    dry_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("sluice starting");

    let config = Config::from_file(&args.config).context(ConfigSnafu)?;

    if args.dry_run {
        print_plan(&config);
        return Ok(());
    }

    if config.metrics.enabled {
        let addr = config.metrics.address.parse().context(AddressParseSnafu)?;
        metrics::init(addr).context(MetricsSnafu)?;
        debug!(
            "Metrics endpoint listening on http://{}/metrics",
            config.metrics.address
        );
    }

    let stats = run_pipeline(config).await?;

    info!("Pipeline completed");
    info!("  Records read: {}", stats.records_read);
    info!("  Records dispatched: {}", stats.records_dispatched);
    info!("  Records skipped (checkpoint): {}", stats.records_skipped);
    info!("  Records filtered: {}", stats.records_filtered);
    info!("  Records failed: {}", stats.records_failed);
    info!("  Delivery failures: {}", stats.delivery_failures);
    info!("  Sources failed: {}", stats.sources_failed);
    info!("  Checkpoints saved: {}", stats.checkpoints_saved);
    info!(
        "  Throughput: {} records, avg latency {:.4}s, {} errors, {} warnings",
        stats.monitor.throughput,
        stats.monitor.avg_latency_secs,
        stats.monitor.errors,
        stats.monitor.warnings
    );

    Ok(())
}

fn print_plan(config: &Config) {
    info!("Dry run mode - validating configuration");
    for source in &config.sources {
        match source {
            SourceConfig::File { path, format, .. } => {
                info!("Source: file {} ({format:?})", path.display())
            }
            SourceConfig::Http { url, format } => info!("Source: http {url} ({format:?})"),
        }
    }
    for (i, stage) in config.transformers.iter().enumerate() {
        info!("Transformer {}: {stage:?}", i + 1);
    }
    for destination in &config.destinations {
        match destination {
            DestinationConfig::File { path, format } => {
                info!("Destination: file {} ({format:?})", path.display())
            }
            DestinationConfig::Http { url, method, .. } => {
                info!("Destination: http {method:?} {url}")
            }
        }
    }
    let pipeline = &config.pipeline;
    info!("Max concurrent tasks: {}", pipeline.max_concurrent_tasks);
    info!(
        "Retry: {} attempts, {}s apart",
        pipeline.retry.attempts, pipeline.retry.delay_secs
    );
    if pipeline.recovery.enabled {
        info!(
            "Checkpoint: {} every {} records",
            pipeline.recovery.checkpoint_path.display(),
            pipeline.recovery.checkpoint_frequency
        );
    }
    info!("Configuration is valid");
}
