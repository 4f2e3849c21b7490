//! Per-source driver loop.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::{Counters, RunState};
use crate::emit;
use crate::metrics::events::{
    FailureContained, FailureStage, RecordsDispatched, RecordsRead, RecordsSkipped,
};
use crate::record::Record;
use crate::source::Source;

/// Pull every record of `source` through the pipeline.
///
/// The source is opened with retry. A stream item that fails ends this
/// driver after a checkpoint flush; other drivers are unaffected.
pub(super) async fn drive(state: Arc<RunState>, source: Arc<dyn Source>) {
    let name = source.name();

    let stream = state
        .retry
        .run(&format!("open {name}"), || source.open(&state.ctx))
        .await;
    let mut stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            Counters::incr(&state.counters.sources_failed);
            emit!(FailureContained {
                stage: FailureStage::Open
            });
            state
                .monitor
                .log_error(&format!("Source {name} could not be opened: {e}"));
            return;
        }
    };
    debug!(source = name, "Source opened");

    loop {
        let next = tokio::select! {
            biased;
            _ = state.shutdown.cancelled() => {
                info!(source = name, "Shutdown requested, driver stopping");
                break;
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(record)) => process(&state, name, record).await,
            Some(Err(e)) => {
                Counters::incr(&state.counters.sources_failed);
                emit!(FailureContained {
                    stage: FailureStage::Read
                });
                state
                    .monitor
                    .log_error(&format!("Source {name} failed mid-stream: {e}"));
                state.flush_checkpoint(name).await;
                return;
            }
            None => break,
        }
    }

    debug!(source = name, "Source driver finished");
}

/// Take one record from read to checkpoint mark.
async fn process(state: &RunState, source: &str, record: Record) {
    let start = Instant::now();
    Counters::incr(&state.counters.records_read);
    emit!(RecordsRead { source, count: 1 });

    let fingerprint = match &state.checkpoint {
        Some(checkpoint) => {
            let fingerprint = record.fingerprint(&state.identity_field);
            if checkpoint.is_completed(&fingerprint).await {
                Counters::incr(&state.counters.records_skipped);
                emit!(RecordsSkipped { count: 1 });
                state
                    .monitor
                    .log_debug(&format!("Skipping completed record {fingerprint}"));
                return;
            }
            Some(fingerprint)
        }
        None => None,
    };

    let record = match state.chain.apply(record).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            Counters::incr(&state.counters.records_filtered);
            return;
        }
        Err(e) => {
            Counters::incr(&state.counters.records_failed);
            emit!(FailureContained {
                stage: FailureStage::Transform
            });
            state
                .monitor
                .log_error(&format!("Dropping record from {source}: {e}"));
            return;
        }
    };

    let record = match &state.cipher {
        Some(cipher) => match cipher.encrypt(&record) {
            Ok(encrypted) => encrypted,
            Err(e) => {
                Counters::incr(&state.counters.records_failed);
                emit!(FailureContained {
                    stage: FailureStage::Encrypt
                });
                state
                    .monitor
                    .log_error(&format!("Dropping record from {source}: {e}"));
                return;
            }
        },
        None => record,
    };

    let failures = state.dispatcher.dispatch(&record, &state.ctx).await;
    Counters::add(&state.counters.delivery_failures, failures as u64);
    Counters::incr(&state.counters.records_dispatched);
    emit!(RecordsDispatched { count: 1 });
    state.monitor.track_processing(start);

    if let (Some(checkpoint), Some(fingerprint)) = (&state.checkpoint, fingerprint) {
        if checkpoint.mark_completed(fingerprint).await {
            state.flush_checkpoint("periodic").await;
        }
    }
}
