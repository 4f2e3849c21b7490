//! Run-scoped logging facade and counters.
//!
//! Every warning and error the engine contains passes through the
//! [`Monitor`], so the counts it reports match what was logged.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::emit;
use crate::metrics::events::RecordProcessed;

/// Point-in-time view of the monitor's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    /// Records that finished processing.
    pub throughput: u64,
    /// Mean processing latency in seconds, 0 when nothing was tracked.
    pub avg_latency_secs: f64,
    pub errors: u64,
    pub warnings: u64,
}

#[derive(Debug, Default)]
pub struct Monitor {
    throughput: AtomicU64,
    errors: AtomicU64,
    warnings: AtomicU64,
    latency_micros: AtomicU64,
    latency_samples: AtomicU64,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_debug(&self, message: &str) {
        debug!("{message}");
    }

    pub fn log_event(&self, message: &str) {
        info!("{message}");
    }

    /// Log a warning and count it.
    pub fn log_warning(&self, message: &str) {
        self.warnings.fetch_add(1, Ordering::Relaxed);
        warn!("{message}");
    }

    /// Log an error and count it.
    pub fn log_error(&self, message: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        error!("{message}");
    }

    /// Record that one record finished processing after starting at `start`.
    pub fn track_processing(&self, start: Instant) {
        let elapsed = start.elapsed();
        self.throughput.fetch_add(1, Ordering::Relaxed);
        self.latency_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
        emit!(RecordProcessed { duration: elapsed });
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        let avg_latency_secs = if samples == 0 {
            0.0
        } else {
            self.latency_micros.load(Ordering::Relaxed) as f64 / samples as f64 / 1_000_000.0
        };

        MonitorSnapshot {
            throughput: self.throughput.load(Ordering::Relaxed),
            avg_latency_secs,
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
        }
    }
}
