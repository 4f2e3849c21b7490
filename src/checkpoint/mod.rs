//! Checkpoint coordination for restart recovery.
//!
//! The coordinator owns the in-memory set of completed fingerprints shared
//! by every source driver, decides when a flush is due, and serializes
//! writes to the [`CheckpointStore`].
//!
//! # Lifecycle
//!
//! 1. [`CheckpointCoordinator::restore`] loads the file once at start.
//! 2. Drivers consult [`CheckpointCoordinator::is_completed`] before
//!    processing a record and call [`CheckpointCoordinator::mark_completed`]
//!    after it was dispatched.
//! 3. Every `frequency` marks, and once at shutdown, the engine calls
//!    [`CheckpointCoordinator::flush`].

pub mod state;
pub mod store;

pub use state::CheckpointState;
pub use store::CheckpointStore;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::info;

use crate::emit;
use crate::error::CheckpointError;
use crate::metrics::MonitorSnapshot;
use crate::metrics::events::{CheckpointRestored, CheckpointSaved};
use crate::record::Fingerprint;

pub struct CheckpointCoordinator {
    store: CheckpointStore,
    frequency: u64,
    completed: Mutex<HashSet<Fingerprint>>,
    marked: AtomicU64,
    saves: AtomicU64,
    /// Held for the duration of a save so concurrent flushes never share
    /// the temp file.
    flush_lock: Mutex<()>,
}

impl CheckpointCoordinator {
    /// Create a coordinator flushing every `frequency` completed records.
    pub fn new(store: CheckpointStore, frequency: u64) -> Self {
        Self {
            store,
            frequency: frequency.max(1),
            completed: Mutex::new(HashSet::new()),
            marked: AtomicU64::new(0),
            saves: AtomicU64::new(0),
            flush_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Load the persisted completed set, replacing the in-memory one.
    ///
    /// Returns the number of restored fingerprints.
    pub async fn restore(&self) -> usize {
        let loaded = self.store.load().await;
        let count = loaded.len();
        *self.completed.lock().await = loaded;

        emit!(CheckpointRestored {
            fingerprints: count
        });
        if count > 0 {
            info!(
                fingerprints = count,
                path = %self.store.path().display(),
                "Restored checkpoint state"
            );
        }
        count
    }

    pub async fn is_completed(&self, fingerprint: &Fingerprint) -> bool {
        self.completed.lock().await.contains(fingerprint)
    }

    /// Mark a record as fully processed.
    ///
    /// Returns `true` when this mark makes a periodic flush due. Marking an
    /// already completed record does not count towards the next flush.
    pub async fn mark_completed(&self, fingerprint: Fingerprint) -> bool {
        if !self.completed.lock().await.insert(fingerprint) {
            return false;
        }
        let marked = self.marked.fetch_add(1, Ordering::SeqCst) + 1;
        marked % self.frequency == 0
    }

    pub async fn completed_count(&self) -> usize {
        self.completed.lock().await.len()
    }

    /// Number of successful saves so far.
    pub fn saves(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    /// Durably write the current completed set.
    pub async fn flush(&self, metrics: MonitorSnapshot) -> Result<(), CheckpointError> {
        let _guard = self.flush_lock.lock().await;
        let start = Instant::now();

        // The completed set lock is released before any I/O.
        let state = {
            let completed = self.completed.lock().await;
            CheckpointState::capture(&completed, metrics)
        };
        let fingerprints = state.processed_ids.len();

        self.store.save(&state).await?;
        self.saves.fetch_add(1, Ordering::SeqCst);

        emit!(CheckpointSaved {
            fingerprints,
            duration: start.elapsed(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn coordinator(dir: &TempDir, frequency: u64) -> CheckpointCoordinator {
        CheckpointCoordinator::new(
            CheckpointStore::new(dir.path().join("checkpoint.json")),
            frequency,
        )
    }

    #[tokio::test]
    async fn test_flush_due_every_frequency_marks() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(&dir, 2);

        assert!(!coordinator.mark_completed("a".into()).await);
        assert!(coordinator.mark_completed("b".into()).await);
        assert!(!coordinator.mark_completed("c".into()).await);
        assert!(coordinator.mark_completed("d".into()).await);
    }

    #[tokio::test]
    async fn test_repeated_mark_does_not_advance_flush() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(&dir, 2);

        assert!(!coordinator.mark_completed("a".into()).await);
        assert!(!coordinator.mark_completed("a".into()).await);
        assert!(!coordinator.mark_completed("a".into()).await);
        assert_eq!(coordinator.completed_count().await, 1);

        assert!(coordinator.mark_completed("b".into()).await);
    }

    #[tokio::test]
    async fn test_flush_then_restore() {
        let dir = TempDir::new().unwrap();
        let first = coordinator(&dir, 10);
        first.mark_completed("id:1".into()).await;
        first.mark_completed("id:2".into()).await;
        first.flush(MonitorSnapshot::default()).await.unwrap();
        assert_eq!(first.saves(), 1);

        let second = coordinator(&dir, 10);
        assert_eq!(second.restore().await, 2);
        assert!(second.is_completed(&"id:1".into()).await);
        assert!(!second.is_completed(&"id:3".into()).await);
    }

    #[tokio::test]
    async fn test_concurrent_flushes_serialize() {
        let dir = TempDir::new().unwrap();
        let coordinator = std::sync::Arc::new(coordinator(&dir, 1));
        for i in 0..20 {
            coordinator.mark_completed(format!("id:{i}").into()).await;
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator.flush(MonitorSnapshot::default()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(coordinator.saves(), 8);
        assert_eq!(coordinator.store().load().await.len(), 20);
    }
}
