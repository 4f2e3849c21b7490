//! Error types for sluice using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase.

use snafu::prelude::*;
use std::path::PathBuf;

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Concurrency budget must allow at least one in-flight call.
    #[snafu(display("max_concurrent_tasks must be at least 1"))]
    ZeroConcurrency,

    /// Retry attempts must be at least one.
    #[snafu(display("retry attempts must be at least 1"))]
    ZeroRetryAttempts,

    /// Retry delay is negative or not a finite number.
    #[snafu(display("retry delay must be a finite, non-negative number of seconds (got {delay})"))]
    InvalidRetryDelay { delay: f64 },

    /// Checkpoint frequency must be at least one record.
    #[snafu(display("checkpoint_frequency must be at least 1"))]
    ZeroCheckpointFrequency,

    /// Checkpoint path is empty while recovery is enabled.
    #[snafu(display("checkpoint_path cannot be empty when recovery is enabled"))]
    EmptyCheckpointPath,

    /// Multipart chunk size must be at least one byte.
    #[snafu(display("multipart chunk_size_bytes must be at least 1"))]
    ZeroChunkSize,

    /// Encryption is enabled without a key.
    #[snafu(display("encryption is enabled but no key was provided"))]
    MissingEncryptionKey,

    /// Encryption is enabled but no cipher was registered with the pipeline.
    #[snafu(display(
        "encryption is enabled but no payload cipher was registered; \
         build one from the key with PipelineBuilder::cipher_with"
    ))]
    MissingCipher,

    /// The configuration defines no sources.
    #[snafu(display("at least one source must be configured"))]
    NoSources,

    /// CSV delimiters must be a single ASCII character.
    #[snafu(display("CSV delimiter {delimiter:?} is not a single ASCII character"))]
    InvalidDelimiter { delimiter: char },

    /// Bloom filter parameters are out of range.
    #[snafu(display("invalid deduplication settings"))]
    InvalidDedup { source: DedupError },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },
}

// ============ Reader Errors ============

/// Errors that can occur while reading a file in chunks.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReaderError {
    /// The file could not be opened or inspected.
    #[snafu(display("Failed to open {}", path.display()))]
    Open {
        source: std::io::Error,
        path: PathBuf,
    },

    /// Reading a chunk failed.
    #[snafu(display("Failed to read chunk {chunk} of {}", path.display()))]
    ReadChunk {
        source: std::io::Error,
        path: PathBuf,
        chunk: u64,
    },
}

// ============ Source Errors ============

/// Errors raised by record sources.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    /// IO error on a file source.
    #[snafu(display("IO error reading {}", path.display()))]
    SourceIo {
        source: std::io::Error,
        path: PathBuf,
    },

    /// Chunked reading failed.
    #[snafu(display("Chunked read failed"))]
    Chunked { source: ReaderError },

    /// A JSON document could not be parsed.
    #[snafu(display("Invalid JSON in {origin}"))]
    SourceJson {
        source: serde_json::Error,
        origin: String,
    },

    /// A CSV row could not be parsed.
    #[snafu(display("Invalid CSV row in {}", path.display()))]
    SourceCsv { source: csv::Error, path: PathBuf },

    /// HTTP request failed.
    #[snafu(display("HTTP request to {url} failed"))]
    SourceHttp { source: reqwest::Error, url: String },

    /// HTTP endpoint answered with an error status.
    #[snafu(display("HTTP request to {url} returned status {status}"))]
    SourceStatus { url: String, status: u16 },
}

// ============ Transform Errors ============

/// Errors raised by transformer stages.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransformError {
    /// The record does not have the shape the stage requires.
    #[snafu(display("Malformed record in stage {stage}: {message}"))]
    Malformed { stage: String, message: String },

    /// Any other stage failure.
    #[snafu(display("Stage {stage} failed: {message}"))]
    StageFailed { stage: String, message: String },
}

// ============ Sink Errors ============

/// Errors raised by destinations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// IO error writing to a file destination.
    #[snafu(display("IO error writing {}", path.display()))]
    SinkIo {
        source: std::io::Error,
        path: PathBuf,
    },

    /// Record could not be serialized.
    #[snafu(display("Failed to serialize record"))]
    SinkSerialize { source: serde_json::Error },

    /// CSV encoding failed.
    #[snafu(display("Failed to encode CSV row"))]
    SinkCsv { source: csv::Error },

    /// HTTP request failed.
    #[snafu(display("HTTP request to {url} failed"))]
    SinkHttp { source: reqwest::Error, url: String },

    /// HTTP endpoint answered with an error status.
    #[snafu(display("HTTP request to {url} returned status {status}"))]
    SinkStatus { url: String, status: u16 },

    /// Any other delivery failure.
    #[snafu(display("Delivery to {destination} failed: {message}"))]
    DeliveryFailed {
        destination: String,
        message: String,
    },
}

// ============ Checkpoint Errors ============

/// Errors that can occur while persisting or restoring checkpoints.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CheckpointError {
    /// Reading the checkpoint file failed.
    #[snafu(display("Failed to read checkpoint {}", path.display()))]
    CheckpointRead {
        source: std::io::Error,
        path: PathBuf,
    },

    /// The checkpoint file is not valid JSON for a checkpoint.
    #[snafu(display("Malformed checkpoint {}", path.display()))]
    CheckpointParse {
        source: serde_json::Error,
        path: PathBuf,
    },

    /// Serializing the checkpoint failed.
    #[snafu(display("Failed to serialize checkpoint"))]
    CheckpointSerialize { source: serde_json::Error },

    /// Writing the temporary checkpoint file failed.
    #[snafu(display("Failed to write checkpoint {}", path.display()))]
    CheckpointWrite {
        source: std::io::Error,
        path: PathBuf,
    },

    /// Renaming the temporary file over the checkpoint failed.
    #[snafu(display("Failed to move {} into place", path.display()))]
    CheckpointRename {
        source: std::io::Error,
        path: PathBuf,
    },
}

// ============ Dedup Errors ============

/// Errors that can occur while building a bloom filter.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DedupError {
    /// Capacity must be at least one element.
    #[snafu(display("bloom filter capacity must be at least 1"))]
    ZeroCapacity,

    /// Error rate must be strictly between 0 and 1.
    #[snafu(display("bloom filter error rate must be in (0, 1), got {rate}"))]
    InvalidErrorRate { rate: f64 },

    /// The requested sizing needs more memory than a filter may use.
    #[snafu(display(
        "bloom filter for {capacity} items needs {bits} bits, more than can be allocated"
    ))]
    TooLarge { capacity: u64, bits: u64 },
}

// ============ Cipher Errors ============

/// Errors raised by payload ciphers.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CipherError {
    /// Encryption of a record failed.
    #[snafu(display("Payload encryption failed: {message}"))]
    Encrypt { message: String },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Pipeline Error (top-level) ============

/// Top-level pipeline errors that aggregate all error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// TLS certificate could not be read.
    #[snafu(display("Failed to read TLS certificate {}", path.display()))]
    TlsCertificateRead {
        source: std::io::Error,
        path: PathBuf,
    },

    /// Shared HTTP transport could not be built.
    #[snafu(display("Failed to build HTTP transport"))]
    Transport { source: reqwest::Error },

    /// Address parsing error.
    #[snafu(display("Failed to parse address"))]
    AddressParse { source: std::net::AddrParseError },

    /// Metrics error.
    #[snafu(display("Metrics error"))]
    Metrics { source: MetricsError },
}
