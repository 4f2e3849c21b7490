//! Configuration parsing and validation.
//!
//! Handles loading the pipeline definition from a YAML file with
//! environment variable interpolation, and checks every setting the engine
//! relies on before anything runs.

mod vars;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dedup::BloomFilter;
use crate::error::{
    ConfigError, EmptyCheckpointPathSnafu, EnvInterpolationSnafu, InvalidDedupSnafu,
    InvalidDelimiterSnafu, InvalidRetryDelaySnafu, MissingEncryptionKeySnafu, NoSourcesSnafu,
    ReadFileSnafu, YamlParseSnafu, ZeroCheckpointFrequencySnafu, ZeroChunkSizeSnafu,
    ZeroConcurrencySnafu, ZeroRetryAttemptsSnafu,
};
use crate::record::DEFAULT_IDENTITY_FIELD;
use crate::retry::RetryPolicy;

/// Byte size constants (binary/IEC units).
pub const KB: u64 = 1024;
pub const MB: u64 = 1024 * KB;

/// Main configuration structure for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Engine settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Metrics configuration (optional, enabled by default).
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub sources: Vec<SourceConfig>,
    /// Applied in order to every record.
    #[serde(default)]
    pub transformers: Vec<TransformerConfig>,
    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,
}

/// Metrics configuration for Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    /// Address to bind the metrics HTTP server (default: "0.0.0.0:9090").
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

// ============ Engine ============

/// Immutable engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum destination calls in flight across all sources (default: 10).
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub multipart: MultipartConfig,
    #[serde(default)]
    pub encryption: EncryptionConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            retry: RetryConfig::default(),
            tls: TlsConfig::default(),
            recovery: RecoveryConfig::default(),
            multipart: MultipartConfig::default(),
            encryption: EncryptionConfig::default(),
        }
    }
}

fn default_max_concurrent_tasks() -> usize {
    10
}

impl PipelineConfig {
    /// Validate engine settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(self.max_concurrent_tasks > 0, ZeroConcurrencySnafu);
        ensure!(self.retry.attempts > 0, ZeroRetryAttemptsSnafu);
        ensure!(
            self.retry.delay_secs.is_finite() && self.retry.delay_secs >= 0.0,
            InvalidRetryDelaySnafu {
                delay: self.retry.delay_secs
            }
        );
        ensure!(
            self.recovery.checkpoint_frequency > 0,
            ZeroCheckpointFrequencySnafu
        );
        ensure!(
            !self.recovery.enabled || !self.recovery.checkpoint_path.as_os_str().is_empty(),
            EmptyCheckpointPathSnafu
        );
        ensure!(self.multipart.chunk_size_bytes > 0, ZeroChunkSizeSnafu);
        ensure!(
            !self.encryption.enabled
                || self.encryption.key.as_deref().is_some_and(|k| !k.is_empty()),
            MissingEncryptionKeySnafu
        );
        Ok(())
    }
}

/// Retry settings shared by source opens, transformer stages and
/// destination calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first (default: 3).
    #[serde(default = "default_retry_attempts")]
    pub attempts: u32,
    /// Fixed delay between attempts in seconds (default: 1.0).
    #[serde(default = "default_retry_delay_secs")]
    pub delay_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_retry_attempts(),
            delay_secs: default_retry_delay_secs(),
        }
    }
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> f64 {
    1.0
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        let delay = Duration::try_from_secs_f64(self.delay_secs).unwrap_or_default();
        RetryPolicy::new(self.attempts, delay)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Restrict the shared HTTP client to HTTPS.
    #[serde(default)]
    pub enabled: bool,
    /// Extra PEM root certificate to trust.
    #[serde(default)]
    pub cert_path: Option<PathBuf>,
    /// Verify server certificates (default: true).
    #[serde(default = "default_true")]
    pub verify: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cert_path: None,
            verify: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Checkpoint-based restart recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,
    /// Flush every N completed records (default: 100).
    #[serde(default = "default_checkpoint_frequency")]
    pub checkpoint_frequency: u64,
    /// Field used as a record's identity when present (default: "id").
    #[serde(default = "default_identity_field")]
    pub identity_field: String,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            checkpoint_path: default_checkpoint_path(),
            checkpoint_frequency: default_checkpoint_frequency(),
            identity_field: default_identity_field(),
        }
    }
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("checkpoint.json")
}

fn default_checkpoint_frequency() -> u64 {
    100
}

fn default_identity_field() -> String {
    DEFAULT_IDENTITY_FIELD.to_string()
}

/// Chunked reading of large files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipartConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Files larger than this are read in chunks (default: 100MB).
    #[serde(default = "default_threshold_bytes")]
    pub threshold_bytes: u64,
    /// Size of each chunk (default: 1MB).
    #[serde(default = "default_chunk_size_bytes")]
    pub chunk_size_bytes: u64,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_bytes: default_threshold_bytes(),
            chunk_size_bytes: default_chunk_size_bytes(),
        }
    }
}

fn default_threshold_bytes() -> u64 {
    100 * MB
}

fn default_chunk_size_bytes() -> u64 {
    MB
}

impl MultipartConfig {
    /// Whether a file of `size` bytes should be read in chunks.
    pub fn applies_to(&self, size: u64) -> bool {
        self.enabled && size > self.threshold_bytes
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct EncryptionConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub key: Option<String>,
}

impl fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("enabled", &self.enabled)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// ============ Sources ============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    File {
        path: PathBuf,
        #[serde(default)]
        format: FileFormat,
        /// Field separator for `csv` (default: ',').
        #[serde(default = "default_csv_delimiter")]
        delimiter: char,
        /// First `csv` row holds field names (default: true).
        #[serde(default = "default_true")]
        has_headers: bool,
    },
    Http {
        url: String,
        #[serde(default)]
        format: HttpFormat,
    },
}

fn default_csv_delimiter() -> char {
    ','
}

/// How a file's contents become records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// One `{"line": text}` record per line.
    #[default]
    Lines,
    /// One JSON value per line.
    Jsonl,
    Csv,
    /// A whole JSON document; arrays yield one record per element.
    Json,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpFormat {
    #[default]
    Json,
    Jsonl,
}

// ============ Transformers ============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformerConfig {
    Uppercase,
    SplitFields {
        #[serde(default = "default_split_source_field")]
        source_field: String,
        #[serde(default = "default_split_delimiter")]
        delimiter: String,
        fields: Vec<String>,
    },
    Dedup {
        #[serde(default = "default_dedup_capacity")]
        capacity: u64,
        #[serde(default = "default_dedup_error_rate")]
        error_rate: f64,
    },
}

fn default_split_source_field() -> String {
    crate::record::LINE_FIELD.to_string()
}

fn default_split_delimiter() -> String {
    ",".to_string()
}

fn default_dedup_capacity() -> u64 {
    1_000_000
}

fn default_dedup_error_rate() -> f64 {
    0.01
}

// ============ Destinations ============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DestinationConfig {
    File {
        path: PathBuf,
        #[serde(default)]
        format: SinkFormat,
    },
    Http {
        url: String,
        #[serde(default)]
        method: HttpMethod,
        #[serde(default)]
        headers: IndexMap<String, String>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkFormat {
    #[default]
    Jsonl,
    Csv,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    #[default]
    Post,
    Put,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_options(path, true)
    }

    /// Load configuration from a YAML file with optional environment variable interpolation.
    pub fn from_file_with_options(
        path: impl AsRef<Path>,
        interpolate_env: bool,
    ) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;
        Self::from_yaml_with_options(&content, interpolate_env)
    }

    /// Parse configuration from YAML text, interpolating environment variables.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Self::from_yaml_with_options(content, true)
    }

    fn from_yaml_with_options(content: &str, interpolate_env: bool) -> Result<Self, ConfigError> {
        let content = if interpolate_env {
            let result = vars::interpolate(content);
            if !result.is_ok() {
                let error_msg = result.errors.join("\n");
                return EnvInterpolationSnafu { message: error_msg }.fail();
            }
            result.text
        } else {
            content.to_string()
        };

        let config: Config = serde_yaml::from_str(&content).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.validate()?;
        ensure!(!self.sources.is_empty(), NoSourcesSnafu);
        for source in &self.sources {
            if let SourceConfig::File { delimiter, .. } = source {
                ensure!(
                    delimiter.is_ascii(),
                    InvalidDelimiterSnafu {
                        delimiter: *delimiter
                    }
                );
            }
        }
        for transformer in &self.transformers {
            if let TransformerConfig::Dedup {
                capacity,
                error_rate,
            } = transformer
            {
                BloomFilter::check_params(*capacity, *error_rate).context(InvalidDedupSnafu)?;
            }
        }
        Ok(())
    }
}
