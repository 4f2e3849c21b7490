//! Transformer stages.
//!
//! A transformer maps a record to a new record, or to `None` when the
//! record should be dropped from further processing.

pub mod dedup;
pub mod text;

pub use dedup::DedupTransformer;
pub use text::{SplitFieldsTransformer, UppercaseTransformer};

use async_trait::async_trait;
use snafu::prelude::*;
use std::sync::Arc;

use crate::config::TransformerConfig;
use crate::error::{ConfigError, InvalidDedupSnafu, TransformError};
use crate::record::Record;

#[async_trait]
pub trait Transformer: Send + Sync {
    /// Stage name, used as the retry label and in logs.
    fn name(&self) -> &str;

    /// Transform `record`. `Ok(None)` filters it out.
    async fn apply(&self, record: Record) -> Result<Option<Record>, TransformError>;
}

/// Adapts a synchronous function into a [`Transformer`].
pub struct FnTransformer<F> {
    name: String,
    f: F,
}

impl<F> FnTransformer<F>
where
    F: Fn(Record) -> Result<Option<Record>, TransformError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> Transformer for FnTransformer<F>
where
    F: Fn(Record) -> Result<Option<Record>, TransformError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, record: Record) -> Result<Option<Record>, TransformError> {
        (self.f)(record)
    }
}

/// Build the stage described by `config`.
///
/// `identity_field` names the field that identifies a record, used as the
/// deduplication key.
pub fn from_config(
    config: &TransformerConfig,
    identity_field: &str,
) -> Result<Arc<dyn Transformer>, ConfigError> {
    Ok(match config {
        TransformerConfig::Uppercase => Arc::new(UppercaseTransformer),
        TransformerConfig::SplitFields {
            source_field,
            delimiter,
            fields,
        } => Arc::new(SplitFieldsTransformer::new(
            source_field.clone(),
            delimiter.clone(),
            fields.clone(),
        )),
        TransformerConfig::Dedup {
            capacity,
            error_rate,
        } => Arc::new(
            DedupTransformer::new(*capacity, *error_rate)
                .context(InvalidDedupSnafu)?
                .with_identity_field(identity_field),
        ),
    })
}
