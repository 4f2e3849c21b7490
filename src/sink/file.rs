//! Append-only file destination.

use async_trait::async_trait;
use snafu::prelude::*;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::Destination;
use crate::config::SinkFormat;
use crate::error::{SinkCsvSnafu, SinkError, SinkIoSnafu, SinkSerializeSnafu};
use crate::pipeline::RunContext;
use crate::record::{Record, scalar_text};

/// Appends one line per record to a local file.
///
/// CSV output starts with a header row taken from the first record written
/// to an empty file.
#[derive(Debug)]
pub struct FileSink {
    name: String,
    path: PathBuf,
    format: SinkFormat,
    /// Serializes appends so concurrent drivers never interleave lines.
    write_lock: Mutex<()>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>, format: SinkFormat) -> Self {
        let path = path.into();
        Self {
            name: format!("file:{}", path.display()),
            path,
            format,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode(&self, record: &Record, with_header: bool) -> Result<Vec<u8>, SinkError> {
        match self.format {
            SinkFormat::Jsonl => {
                let mut line = serde_json::to_vec(record).context(SinkSerializeSnafu)?;
                line.push(b'\n');
                Ok(line)
            }
            SinkFormat::Csv => {
                let mut writer = csv::Writer::from_writer(Vec::new());
                if with_header {
                    writer
                        .write_record(record.iter().map(|(name, _)| name.as_str()))
                        .context(SinkCsvSnafu)?;
                }
                writer
                    .write_record(record.iter().map(|(_, value)| scalar_text(value)))
                    .context(SinkCsvSnafu)?;
                writer
                    .into_inner()
                    .map_err(|e| csv::Error::from(e.into_error()))
                    .context(SinkCsvSnafu)
            }
        }
    }
}

#[async_trait]
impl Destination for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, record: &Record, _ctx: &RunContext) -> Result<(), SinkError> {
        let _guard = self.write_lock.lock().await;
        let io = || SinkIoSnafu {
            path: self.path.clone(),
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.context(io())?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .context(io())?;
        let is_empty = file.metadata().await.context(io())?.len() == 0;

        let bytes = self.encode(record, is_empty)?;
        file.write_all(&bytes).await.context(io())?;
        file.flush().await.context(io())?;
        Ok(())
    }
}
