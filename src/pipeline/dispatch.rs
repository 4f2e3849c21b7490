//! Fan-out of one record to every destination.

use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;

use super::RunContext;
use crate::emit;
use crate::error::{DeliveryFailedSnafu, SinkError};
use crate::metrics::events::{ActiveDispatches, FailureContained, FailureStage};
use crate::record::Record;
use crate::retry::Retry;
use crate::sink::Destination;

/// Delivers records to all destinations concurrently.
///
/// Each attempt of each call holds one permit of the shared semaphore, so
/// the number of destination calls in flight across all drivers never
/// exceeds the semaphore size. Permits are released during retry delays.
#[derive(Clone)]
pub struct Dispatcher {
    destinations: Vec<Arc<dyn Destination>>,
    semaphore: Arc<Semaphore>,
    retry: Retry,
    in_flight: Arc<AtomicUsize>,
}

impl Dispatcher {
    pub fn new(
        destinations: Vec<Arc<dyn Destination>>,
        semaphore: Arc<Semaphore>,
        retry: Retry,
    ) -> Self {
        Self {
            destinations,
            semaphore,
            retry,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn destination_count(&self) -> usize {
        self.destinations.len()
    }

    /// Send `record` to every destination and wait for all of them.
    ///
    /// Returns the number of destinations that still failed after retries.
    /// Those failures are logged and contained here.
    pub async fn dispatch(&self, record: &Record, ctx: &RunContext) -> usize {
        let calls = self
            .destinations
            .iter()
            .map(|destination| self.deliver(destination.as_ref(), record, ctx));

        join_all(calls)
            .await
            .into_iter()
            .filter(|result| result.is_err())
            .inspect(|_| {
                emit!(FailureContained {
                    stage: FailureStage::Deliver
                })
            })
            .count()
    }

    async fn deliver(
        &self,
        destination: &dyn Destination,
        record: &Record,
        ctx: &RunContext,
    ) -> Result<(), SinkError> {
        self.retry
            .run(destination.name(), || self.attempt(destination, record, ctx))
            .await
    }

    async fn attempt(
        &self,
        destination: &dyn Destination,
        record: &Record,
        ctx: &RunContext,
    ) -> Result<(), SinkError> {
        let Ok(_permit) = self.semaphore.acquire().await else {
            return DeliveryFailedSnafu {
                destination: destination.name(),
                message: "dispatch semaphore closed",
            }
            .fail();
        };

        let active = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        emit!(ActiveDispatches { count: active });

        let result = destination.send(record, ctx).await;

        let active = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        emit!(ActiveDispatches { count: active });
        result
    }
}
