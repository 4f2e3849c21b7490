//! Record sources.
//!
//! A source turns some external input into a lazy stream of records. Each
//! call to [`Source::open`] starts the input over from the beginning.

pub mod chunked;
pub mod file;
pub mod http;
mod lines;

pub use chunked::ChunkedReader;
pub use file::FileSource;
pub use http::HttpSource;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use crate::config::{MultipartConfig, SourceConfig};
use crate::error::SourceError;
use crate::pipeline::RunContext;
use crate::record::Record;

/// Lazy, possibly unbounded sequence of records.
pub type RecordStream = BoxStream<'static, Result<Record, SourceError>>;

#[async_trait]
pub trait Source: Send + Sync {
    /// Label used in logs and metrics.
    fn name(&self) -> &str;

    /// Open a fresh stream over this source's records.
    ///
    /// Failures here are retried by the engine; a failing stream item ends
    /// the stream's driver.
    async fn open(&self, ctx: &RunContext) -> Result<RecordStream, SourceError>;
}

/// Build the source described by `config`.
pub fn from_config(config: &SourceConfig, multipart: &MultipartConfig) -> Arc<dyn Source> {
    match config {
        SourceConfig::File {
            path,
            format,
            delimiter,
            has_headers,
        } => Arc::new(
            FileSource::new(path, *format)
                .with_csv_options(*delimiter as u8, *has_headers)
                .with_multipart(multipart.clone()),
        ),
        SourceConfig::Http { url, format } => Arc::new(HttpSource::new(url, *format)),
    }
}

/// Records held by a JSON document: one per array element, or the whole
/// document when it is not an array.
pub(crate) fn records_from_document(document: Value) -> Vec<Record> {
    match document {
        Value::Array(items) => items.into_iter().map(Record::from_value).collect(),
        other => vec![Record::from_value(other)],
    }
}

/// Parse one JSON-lines entry. Blank lines yield nothing; malformed lines
/// are logged and skipped.
pub(crate) fn parse_json_line(line: &str, origin: &str) -> Option<Record> {
    if line.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(line) {
        Ok(value) => Some(Record::from_value(value)),
        Err(e) => {
            warn!(origin, error = %e, "Skipping malformed JSON line");
            None
        }
    }
}
