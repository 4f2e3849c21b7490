//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in the pipeline.
//! Events implement the `InternalEvent` trait which emits the corresponding
//! Prometheus metric.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when a source yields records.
pub struct RecordsRead<'a> {
    pub source: &'a str,
    pub count: u64,
}

impl InternalEvent for RecordsRead<'_> {
    fn emit(self) {
        trace!(source = self.source, count = self.count, "Records read");
        counter!("sluice_records_read_total", "source" => self.source.to_owned())
            .increment(self.count);
    }
}

/// Event emitted when a record is skipped because it was already checkpointed.
pub struct RecordsSkipped {
    pub count: u64,
}

impl InternalEvent for RecordsSkipped {
    fn emit(self) {
        trace!(count = self.count, "Records skipped");
        counter!("sluice_records_skipped_total").increment(self.count);
    }
}

/// Event emitted when a transformer filters a record out.
pub struct RecordsFiltered<'a> {
    pub stage: &'a str,
}

impl InternalEvent for RecordsFiltered<'_> {
    fn emit(self) {
        trace!(stage = self.stage, "Record filtered");
        counter!("sluice_records_filtered_total", "stage" => self.stage.to_owned()).increment(1);
    }
}

/// Event emitted when a record has been handed to every destination.
pub struct RecordsDispatched {
    pub count: u64,
}

impl InternalEvent for RecordsDispatched {
    fn emit(self) {
        trace!(count = self.count, "Records dispatched");
        counter!("sluice_records_dispatched_total").increment(self.count);
    }
}

/// Stage at which a record or source failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Open,
    Read,
    Transform,
    Encrypt,
    Deliver,
    Checkpoint,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Open => "open",
            FailureStage::Read => "read",
            FailureStage::Transform => "transform",
            FailureStage::Encrypt => "encrypt",
            FailureStage::Deliver => "deliver",
            FailureStage::Checkpoint => "checkpoint",
        }
    }
}

/// Event emitted when a failure is contained by the engine.
pub struct FailureContained {
    pub stage: FailureStage,
}

impl InternalEvent for FailureContained {
    fn emit(self) {
        trace!(stage = self.stage.as_str(), "Failure contained");
        counter!("sluice_failures_total", "stage" => self.stage.as_str()).increment(1);
    }
}

/// Event emitted for every failed attempt that will be retried.
pub struct RetryScheduled<'a> {
    pub label: &'a str,
    pub attempt: u32,
}

impl InternalEvent for RetryScheduled<'_> {
    fn emit(self) {
        trace!(label = self.label, attempt = self.attempt, "Retry scheduled");
        counter!("sluice_retries_total", "label" => self.label.to_owned()).increment(1);
    }
}

/// Event emitted when the number of in-flight destination calls changes.
pub struct ActiveDispatches {
    pub count: usize,
}

impl InternalEvent for ActiveDispatches {
    fn emit(self) {
        trace!(count = self.count, "Active dispatches");
        gauge!("sluice_active_dispatches").set(self.count as f64);
    }
}

/// Event emitted when the number of running source drivers changes.
pub struct ActiveDrivers {
    pub count: usize,
}

impl InternalEvent for ActiveDrivers {
    fn emit(self) {
        trace!(count = self.count, "Active drivers");
        gauge!("sluice_active_drivers").set(self.count as f64);
    }
}

/// Event emitted when a record finishes processing.
pub struct RecordProcessed {
    pub duration: Duration,
}

impl InternalEvent for RecordProcessed {
    fn emit(self) {
        trace!(
            duration_ms = self.duration.as_millis(),
            "Record processed"
        );
        histogram!("sluice_record_latency_seconds").record(self.duration.as_secs_f64());
    }
}

// ============================================================================
// Chunked reading events
// ============================================================================

/// Event emitted when a chunk of a file is read.
pub struct ChunkRead {
    pub bytes: u64,
}

impl InternalEvent for ChunkRead {
    fn emit(self) {
        trace!(bytes = self.bytes, "Chunk read");
        counter!("sluice_chunks_read_total").increment(1);
        counter!("sluice_bytes_read_total").increment(self.bytes);
    }
}

/// Event emitted when invalid UTF-8 was replaced during decoding.
pub struct LossyDecode {
    pub chunk: u64,
}

impl InternalEvent for LossyDecode {
    fn emit(self) {
        trace!(chunk = self.chunk, "Lossy decode");
        counter!("sluice_lossy_decodes_total").increment(1);
    }
}

// ============================================================================
// Checkpointing & recovery events
// ============================================================================

/// Event emitted when a checkpoint is written.
pub struct CheckpointSaved {
    pub fingerprints: usize,
    pub duration: Duration,
}

impl InternalEvent for CheckpointSaved {
    fn emit(self) {
        trace!(
            fingerprints = self.fingerprints,
            duration_ms = self.duration.as_millis(),
            "Checkpoint saved"
        );
        counter!("sluice_checkpoints_saved_total").increment(1);
        gauge!("sluice_checkpoint_fingerprints").set(self.fingerprints as f64);
        histogram!("sluice_checkpoint_write_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when fingerprints are restored from a checkpoint.
pub struct CheckpointRestored {
    pub fingerprints: usize,
}

impl InternalEvent for CheckpointRestored {
    fn emit(self) {
        trace!(fingerprints = self.fingerprints, "Checkpoint restored");
        gauge!("sluice_checkpoint_fingerprints").set(self.fingerprints as f64);
    }
}
