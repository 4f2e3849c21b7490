//! sluice: a concurrent record pipeline.
//!
//! Records flow from sources (local files, HTTP endpoints) through an
//! ordered chain of transformers to every destination, with bounded
//! concurrency, fixed-delay retry, and checkpoint-based restart recovery.
//!
//! # Example
//!
//! ```ignore
//! use snafu::prelude::*;
//! use sluice::{Config, run_pipeline, error::{ConfigSnafu, PipelineError}};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), PipelineError> {
//!     let config = Config::from_file("pipeline.yaml").context(ConfigSnafu)?;
//!     let stats = run_pipeline(config).await?;
//!     println!("Dispatched {} records", stats.records_dispatched);
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod cipher;
pub mod config;
pub mod dedup;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod record;
pub mod retry;
pub mod sink;
pub mod source;
pub mod transform;

// Re-export main types
pub use config::Config;
pub use pipeline::{Pipeline, PipelineBuilder, PipelineStats, RunContext, run_pipeline};
pub use record::{Fingerprint, Record};
