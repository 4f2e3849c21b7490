//! Destinations records are delivered to.
//!
//! Every destination receives each surviving record once per successful
//! call; the engine retries failed calls and never lets one destination's
//! failure affect another.

pub mod file;
pub mod http;

pub use file::FileSink;
pub use http::HttpSink;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::DestinationConfig;
use crate::error::SinkError;
use crate::pipeline::RunContext;
use crate::record::Record;

#[async_trait]
pub trait Destination: Send + Sync {
    /// Label used as the retry label and in logs.
    fn name(&self) -> &str;

    /// Deliver one record.
    async fn send(&self, record: &Record, ctx: &RunContext) -> Result<(), SinkError>;
}

/// Build the destination described by `config`.
pub fn from_config(config: &DestinationConfig) -> Arc<dyn Destination> {
    match config {
        DestinationConfig::File { path, format } => Arc::new(FileSink::new(path, *format)),
        DestinationConfig::Http {
            url,
            method,
            headers,
        } => Arc::new(HttpSink::new(url, *method).with_headers(headers.clone())),
    }
}
