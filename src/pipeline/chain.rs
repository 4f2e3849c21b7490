//! Sequential transformer chain.

use std::sync::Arc;

use crate::emit;
use crate::error::TransformError;
use crate::metrics::events::RecordsFiltered;
use crate::record::Record;
use crate::retry::Retry;
use crate::transform::Transformer;

/// Runs a record through every stage in order, each stage retry-wrapped
/// under its own name. The first stage to return `None` ends the chain.
#[derive(Clone)]
pub struct TransformChain {
    stages: Vec<Arc<dyn Transformer>>,
    retry: Retry,
}

impl TransformChain {
    pub fn new(stages: Vec<Arc<dyn Transformer>>, retry: Retry) -> Self {
        Self { stages, retry }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub async fn apply(&self, record: Record) -> Result<Option<Record>, TransformError> {
        let mut current = record;

        for stage in &self.stages {
            let output = self
                .retry
                .run(stage.name(), || stage.apply(current.clone()))
                .await?;

            match output {
                Some(next) => current = next,
                None => {
                    emit!(RecordsFiltered {
                        stage: stage.name()
                    });
                    return Ok(None);
                }
            }
        }

        Ok(Some(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageFailedSnafu;
    use crate::metrics::Monitor;
    use crate::retry::RetryPolicy;
    use crate::transform::{DedupTransformer, FnTransformer, UppercaseTransformer};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn retry(attempts: u32) -> (Retry, Arc<Monitor>) {
        let monitor = Arc::new(Monitor::new());
        (
            Retry::new(RetryPolicy::new(attempts, Duration::ZERO), monitor.clone()),
            monitor,
        )
    }

    #[tokio::test]
    async fn test_uppercase_then_dedup_filters_repeat() {
        let (retry, _) = retry(3);
        let chain = TransformChain::new(
            vec![
                Arc::new(UppercaseTransformer),
                Arc::new(DedupTransformer::new(10_000, 0.01).unwrap()),
            ],
            retry,
        );

        let first = chain.apply(Record::from_line("x")).await.unwrap();
        assert_eq!(first, Some(Record::from_line("X")));
        assert_eq!(chain.apply(Record::from_line("x")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_filter_short_circuits() {
        let (retry, _) = retry(1);
        let later_calls = Arc::new(AtomicU32::new(0));
        let counter = later_calls.clone();

        let chain = TransformChain::new(
            vec![
                Arc::new(FnTransformer::new("drop-all", |_record: Record| Ok(None))),
                Arc::new(FnTransformer::new("count", move |record: Record| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Some(record))
                })),
            ],
            retry,
        );

        assert_eq!(chain.apply(Record::from_line("a")).await.unwrap(), None);
        assert_eq!(later_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stage_retried_with_same_input() {
        let (retry, monitor) = retry(3);
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();

        let chain = TransformChain::new(
            vec![Arc::new(FnTransformer::new("flaky", move |record: Record| {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    return StageFailedSnafu {
                        stage: "flaky",
                        message: "transient",
                    }
                    .fail();
                }
                Ok(Some(record))
            }))],
            retry,
        );

        let out = chain.apply(Record::from_line("keep")).await.unwrap();
        assert_eq!(out, Some(Record::from_line("keep")));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(monitor.snapshot().warnings, 1);
    }

    #[tokio::test]
    async fn test_exhausted_stage_is_an_error() {
        let (retry, monitor) = retry(2);
        let chain = TransformChain::new(
            vec![Arc::new(FnTransformer::new("broken", |_record: Record| {
                StageFailedSnafu {
                    stage: "broken",
                    message: "always",
                }
                .fail()
            }))],
            retry,
        );

        assert!(chain.apply(Record::from_line("a")).await.is_err());
        assert_eq!(monitor.snapshot().errors, 1);
    }
}
