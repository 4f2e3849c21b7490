//! Bloom-filter deduplication stage.

use async_trait::async_trait;

use super::Transformer;
use crate::dedup::{Deduplicator, dedup_key};
use crate::error::{DedupError, TransformError};
use crate::record::Record;

/// Drops records whose key was already seen by this stage.
///
/// One filter is shared by every source driver in the run.
#[derive(Debug)]
pub struct DedupTransformer {
    dedup: Deduplicator,
    identity_field: String,
}

impl DedupTransformer {
    /// Keys records by their `id` field when present.
    pub fn new(capacity: u64, error_rate: f64) -> Result<Self, DedupError> {
        Ok(Self {
            dedup: Deduplicator::new(capacity, error_rate)?,
            identity_field: "id".to_string(),
        })
    }

    /// Key records by `field` instead of `id`.
    pub fn with_identity_field(mut self, field: impl Into<String>) -> Self {
        self.identity_field = field.into();
        self
    }
}

#[async_trait]
impl Transformer for DedupTransformer {
    fn name(&self) -> &str {
        "dedup"
    }

    async fn apply(&self, record: Record) -> Result<Option<Record>, TransformError> {
        let key = dedup_key(&record, &self.identity_field);
        if self.dedup.consider(&key) {
            Ok(None)
        } else {
            Ok(Some(record))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::UppercaseTransformer;
    use serde_json::json;

    #[tokio::test]
    async fn test_uppercase_then_dedup() {
        let dedup = DedupTransformer::new(10_000, 0.01).unwrap();

        let first = UppercaseTransformer
            .apply(Record::from_line("x"))
            .await
            .unwrap()
            .unwrap();
        let first = dedup.apply(first).await.unwrap();
        assert_eq!(first, Some(Record::from_line("X")));

        let second = UppercaseTransformer
            .apply(Record::from_line("x"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dedup.apply(second).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_custom_identity_field() {
        let dedup = DedupTransformer::new(10_000, 0.01)
            .unwrap()
            .with_identity_field("uuid");

        let a = Record::from_value(json!({"uuid": "u1", "id": 1}));
        let b = Record::from_value(json!({"uuid": "u1", "id": 2}));
        let c = Record::from_value(json!({"uuid": "u2", "id": 1}));

        assert!(dedup.apply(a).await.unwrap().is_some());
        assert!(dedup.apply(b).await.unwrap().is_none());
        assert!(dedup.apply(c).await.unwrap().is_some());
    }
}
