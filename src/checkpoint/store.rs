//! Durable checkpoint file.
//!
//! # Atomic Writes
//!
//! Checkpoint updates use an atomic write pattern:
//! 1. Write to temp file: `{path}.tmp`
//! 2. fsync the temp file
//! 3. Rename to final path: `{path}`
//!
//! The checkpoint on disk is therefore either the previous snapshot or the
//! new one, never a partial write.

use snafu::prelude::*;
use std::collections::HashSet;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use super::CheckpointState;
use crate::error::{
    CheckpointError, CheckpointParseSnafu, CheckpointReadSnafu, CheckpointRenameSnafu,
    CheckpointSerializeSnafu, CheckpointWriteSnafu,
};
use crate::record::Fingerprint;

/// Reads and writes the checkpoint file at a fixed path.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Load the completed set.
    ///
    /// A missing file is a fresh start. An unreadable or malformed file is
    /// logged and also treated as a fresh start.
    pub async fn load(&self) -> HashSet<Fingerprint> {
        match self.read().await {
            Ok(Some(state)) => {
                info!(
                    path = %self.path.display(),
                    fingerprints = state.processed_ids.len(),
                    "Loaded checkpoint"
                );
                state.into_completed()
            }
            Ok(None) => {
                debug!(path = %self.path.display(), "No checkpoint found, starting fresh");
                HashSet::new()
            }
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to load checkpoint, starting fresh"
                );
                HashSet::new()
            }
        }
    }

    /// Read the checkpoint document, `None` when the file does not exist.
    pub async fn read(&self) -> Result<Option<CheckpointState>, CheckpointError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).context(CheckpointReadSnafu {
                    path: self.path.clone(),
                });
            }
        };

        let state = serde_json::from_slice(&bytes).context(CheckpointParseSnafu {
            path: self.path.clone(),
        })?;
        Ok(Some(state))
    }

    /// Save a snapshot using temp file + rename.
    pub async fn save(&self, state: &CheckpointState) -> Result<(), CheckpointError> {
        let json = serde_json::to_vec_pretty(state).context(CheckpointSerializeSnafu)?;
        let temp = self.temp_path();

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .context(CheckpointWriteSnafu {
                    path: parent.to_path_buf(),
                })?;
        }

        let mut file = tokio::fs::File::create(&temp)
            .await
            .context(CheckpointWriteSnafu { path: temp.clone() })?;
        file.write_all(&json)
            .await
            .context(CheckpointWriteSnafu { path: temp.clone() })?;
        file.sync_all()
            .await
            .context(CheckpointWriteSnafu { path: temp.clone() })?;
        drop(file);

        tokio::fs::rename(&temp, &self.path)
            .await
            .context(CheckpointRenameSnafu { path: temp })?;

        debug!(
            path = %self.path.display(),
            fingerprints = state.processed_ids.len(),
            "Saved checkpoint"
        );
        Ok(())
    }
}
