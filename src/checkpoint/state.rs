//! Checkpoint state serialization.
//!
//! Defines the on-disk checkpoint document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::metrics::MonitorSnapshot;
use crate::record::Fingerprint;

/// Complete checkpoint state for recovery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Fingerprints of every record that cleared all destinations, sorted.
    pub processed_ids: Vec<Fingerprint>,
    /// Monitor counters at the time of the save.
    #[serde(default)]
    pub metrics: MonitorSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl CheckpointState {
    /// Build a snapshot from the in-memory completed set.
    pub fn capture(completed: &HashSet<Fingerprint>, metrics: MonitorSnapshot) -> Self {
        let mut processed_ids: Vec<Fingerprint> = completed.iter().cloned().collect();
        processed_ids.sort();
        Self {
            processed_ids,
            metrics,
            saved_at: Some(Utc::now()),
        }
    }

    pub fn into_completed(self) -> HashSet<Fingerprint> {
        self.processed_ids.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_sorts_ids() {
        let completed: HashSet<Fingerprint> =
            ["c", "a", "b"].into_iter().map(Fingerprint::from).collect();
        let state = CheckpointState::capture(&completed, MonitorSnapshot::default());

        let ids: Vec<&str> = state.processed_ids.iter().map(Fingerprint::as_str).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(state.saved_at.is_some());
    }

    #[test]
    fn test_minimal_document_parses() {
        let state: CheckpointState =
            serde_json::from_str(r#"{"processed_ids": ["id:1", "id:2"]}"#).unwrap();
        assert_eq!(state.metrics, MonitorSnapshot::default());
        assert_eq!(state.into_completed().len(), 2);
    }
}
