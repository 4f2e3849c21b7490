//! Pipeline engine.
//!
//! One driver task per source pulls records from that source's stream,
//! skips fingerprints already recorded in the checkpoint, runs the
//! transformer chain, optionally encrypts, and fans the result out to every
//! destination. Drivers run concurrently; destination calls from all of
//! them share one concurrency budget.
//!
//! Failures are contained at the smallest scope that still makes sense: a
//! failing destination does not stop the others, a failing record does not
//! stop its driver, and a failing source does not stop the other sources.

mod chain;
mod context;
mod dispatch;
mod driver;
mod signal;

pub use chain::TransformChain;
pub use context::RunContext;
pub use dispatch::Dispatcher;
pub use signal::shutdown_signal;

use serde::Serialize;
use snafu::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::checkpoint::{CheckpointCoordinator, CheckpointStore};
use crate::cipher::PayloadCipher;
use crate::config::{Config, PipelineConfig};
use crate::emit;
use crate::error::{ConfigError, ConfigSnafu, MissingCipherSnafu, NoSourcesSnafu, PipelineError};
use crate::metrics::events::{ActiveDrivers, FailureContained, FailureStage};
use crate::metrics::{Monitor, MonitorSnapshot};
use crate::retry::Retry;
use crate::sink::{self, Destination};
use crate::source::{self, Source};
use crate::transform::{self, Transformer};

/// Statistics about the pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PipelineStats {
    pub records_read: u64,
    /// Already completed in a previous run.
    pub records_skipped: u64,
    /// Dropped by a transformer returning `None`.
    pub records_filtered: u64,
    /// Dropped after a transformer or the cipher failed.
    pub records_failed: u64,
    pub records_dispatched: u64,
    /// Destination calls that failed after all retries.
    pub delivery_failures: u64,
    /// Sources that could not be opened, broke mid-stream, or panicked.
    pub sources_failed: u64,
    pub checkpoints_saved: u64,
    pub checkpoint_failures: u64,
    pub monitor: MonitorSnapshot,
}

#[derive(Debug, Default)]
struct Counters {
    records_read: AtomicU64,
    records_skipped: AtomicU64,
    records_filtered: AtomicU64,
    records_failed: AtomicU64,
    records_dispatched: AtomicU64,
    delivery_failures: AtomicU64,
    sources_failed: AtomicU64,
    checkpoint_failures: AtomicU64,
}

impl Counters {
    fn incr(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

/// Everything a driver needs, shared by all drivers of one run.
struct RunState {
    ctx: RunContext,
    chain: TransformChain,
    dispatcher: Dispatcher,
    cipher: Option<Arc<dyn PayloadCipher>>,
    checkpoint: Option<CheckpointCoordinator>,
    identity_field: String,
    retry: Retry,
    monitor: Arc<Monitor>,
    counters: Counters,
    shutdown: CancellationToken,
}

impl RunState {
    /// Save the checkpoint if recovery is enabled. Failures are logged and
    /// counted; processing continues either way.
    async fn flush_checkpoint(&self, reason: &str) {
        let Some(checkpoint) = &self.checkpoint else {
            return;
        };
        if let Err(e) = checkpoint.flush(self.monitor.snapshot()).await {
            Counters::incr(&self.counters.checkpoint_failures);
            emit!(FailureContained {
                stage: FailureStage::Checkpoint
            });
            self.monitor
                .log_error(&format!("Checkpoint save ({reason}) failed: {e}"));
        }
    }

    fn stats(&self) -> PipelineStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let c = &self.counters;
        PipelineStats {
            records_read: load(&c.records_read),
            records_skipped: load(&c.records_skipped),
            records_filtered: load(&c.records_filtered),
            records_failed: load(&c.records_failed),
            records_dispatched: load(&c.records_dispatched),
            delivery_failures: load(&c.delivery_failures),
            sources_failed: load(&c.sources_failed),
            checkpoints_saved: self.checkpoint.as_ref().map_or(0, |cp| cp.saves()),
            checkpoint_failures: load(&c.checkpoint_failures),
            monitor: self.monitor.snapshot(),
        }
    }
}

/// Assembles a [`Pipeline`] from adapters.
pub struct PipelineBuilder {
    config: PipelineConfig,
    sources: Vec<Arc<dyn Source>>,
    transformers: Vec<Arc<dyn Transformer>>,
    destinations: Vec<Arc<dyn Destination>>,
    cipher: Option<Arc<dyn PayloadCipher>>,
    context: Option<RunContext>,
    monitor: Arc<Monitor>,
    shutdown: CancellationToken,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            sources: Vec::new(),
            transformers: Vec::new(),
            destinations: Vec::new(),
            cipher: None,
            context: None,
            monitor: Arc::new(Monitor::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Start from a parsed configuration with all its adapters built.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut builder = Self::new(config.pipeline.clone());
        for source in &config.sources {
            builder = builder.source(source::from_config(source, &config.pipeline.multipart));
        }
        let identity_field = &config.pipeline.recovery.identity_field;
        for stage in &config.transformers {
            builder = builder.transformer(transform::from_config(stage, identity_field)?);
        }
        for destination in &config.destinations {
            builder = builder.destination(sink::from_config(destination));
        }
        Ok(builder)
    }

    pub fn source(mut self, source: Arc<dyn Source>) -> Self {
        self.sources.push(source);
        self
    }

    /// Append a stage. Stages run in the order they were added.
    pub fn transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformers.push(transformer);
        self
    }

    pub fn destination(mut self, destination: Arc<dyn Destination>) -> Self {
        self.destinations.push(destination);
        self
    }

    /// Cipher applied to every record when encryption is enabled.
    pub fn cipher(mut self, cipher: Arc<dyn PayloadCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Build the cipher from the configured `encryption.key`.
    ///
    /// `make` runs only when encryption is enabled and a key is set; the key
    /// itself is never stored by the pipeline.
    pub fn cipher_with<F>(self, make: F) -> Self
    where
        F: FnOnce(&str) -> Arc<dyn PayloadCipher>,
    {
        let encryption = &self.config.encryption;
        match encryption.key.as_deref() {
            Some(key) if encryption.enabled => {
                let cipher = make(key);
                self.cipher(cipher)
            }
            _ => self,
        }
    }

    /// Use `ctx` instead of building one from the TLS settings.
    pub fn context(mut self, ctx: RunContext) -> Self {
        self.context = Some(ctx);
        self
    }

    pub fn monitor(mut self, monitor: Arc<Monitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn build(self) -> Result<Pipeline, ConfigError> {
        self.config.validate()?;
        ensure!(!self.sources.is_empty(), NoSourcesSnafu);
        ensure!(
            !self.config.encryption.enabled || self.cipher.is_some(),
            MissingCipherSnafu
        );

        Ok(Pipeline {
            config: self.config,
            sources: self.sources,
            transformers: self.transformers,
            destinations: self.destinations,
            cipher: self.cipher,
            context: self.context,
            monitor: self.monitor,
            shutdown: self.shutdown,
        })
    }
}

/// A configured pipeline, ready to run.
pub struct Pipeline {
    config: PipelineConfig,
    sources: Vec<Arc<dyn Source>>,
    transformers: Vec<Arc<dyn Transformer>>,
    destinations: Vec<Arc<dyn Destination>>,
    cipher: Option<Arc<dyn PayloadCipher>>,
    context: Option<RunContext>,
    monitor: Arc<Monitor>,
    shutdown: CancellationToken,
}

impl Pipeline {
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    /// Build a pipeline from a parsed configuration.
    pub fn from_config(config: &Config, shutdown: CancellationToken) -> Result<Self, ConfigError> {
        PipelineBuilder::from_config(config)?
            .shutdown(shutdown)
            .build()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    /// Token that stops every driver from pulling further records.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until every source is exhausted, failed, or shutdown is
    /// requested.
    ///
    /// Only setup problems are returned as errors; everything that goes
    /// wrong while records flow is contained and reported in the stats.
    pub async fn run(&self) -> Result<PipelineStats, PipelineError> {
        let ctx = match &self.context {
            Some(ctx) => ctx.clone(),
            None => RunContext::from_tls(&self.config.tls)?,
        };
        let retry = Retry::new(self.config.retry.policy(), self.monitor.clone());
        let recovery = &self.config.recovery;

        let checkpoint = if recovery.enabled {
            let coordinator = CheckpointCoordinator::new(
                CheckpointStore::new(&recovery.checkpoint_path),
                recovery.checkpoint_frequency,
            );
            coordinator.restore().await;
            Some(coordinator)
        } else {
            None
        };

        let state = Arc::new(RunState {
            ctx,
            chain: TransformChain::new(self.transformers.clone(), retry.clone()),
            dispatcher: Dispatcher::new(
                self.destinations.clone(),
                Arc::new(Semaphore::new(self.config.max_concurrent_tasks)),
                retry.clone(),
            ),
            cipher: self
                .cipher
                .clone()
                .filter(|_| self.config.encryption.enabled),
            checkpoint,
            identity_field: recovery.identity_field.clone(),
            retry,
            monitor: self.monitor.clone(),
            counters: Counters::default(),
            shutdown: self.shutdown.clone(),
        });

        info!(
            sources = self.sources.len(),
            transformers = self.transformers.len(),
            destinations = self.destinations.len(),
            max_concurrent_tasks = self.config.max_concurrent_tasks,
            recovery = recovery.enabled,
            "Starting pipeline"
        );

        let mut drivers = JoinSet::new();
        for source in &self.sources {
            drivers.spawn(driver::drive(state.clone(), source.clone()));
        }
        emit!(ActiveDrivers {
            count: drivers.len()
        });

        while let Some(joined) = drivers.join_next().await {
            emit!(ActiveDrivers {
                count: drivers.len()
            });
            if let Err(e) = joined {
                Counters::incr(&state.counters.sources_failed);
                state
                    .monitor
                    .log_error(&format!("Source driver terminated abnormally: {e}"));
            }
        }

        if self.shutdown.is_cancelled() {
            warn!("Pipeline stopped by shutdown request");
        }
        state.flush_checkpoint("final").await;

        let stats = state.stats();
        info!(
            records_read = stats.records_read,
            records_dispatched = stats.records_dispatched,
            records_skipped = stats.records_skipped,
            records_filtered = stats.records_filtered,
            records_failed = stats.records_failed,
            sources_failed = stats.sources_failed,
            errors = stats.monitor.errors,
            "Pipeline finished"
        );
        Ok(stats)
    }
}

/// Run the pipeline described by `config` with signal handling.
pub async fn run_pipeline(config: Config) -> Result<PipelineStats, PipelineError> {
    let shutdown = CancellationToken::new();
    let pipeline = Pipeline::from_config(&config, shutdown.clone()).context(ConfigSnafu)?;

    // Set up signal handler for graceful shutdown
    tokio::spawn(async move {
        signal::shutdown_signal().await;
        shutdown.cancel();
    });

    pipeline.run().await
}
