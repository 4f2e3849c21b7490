//! Chunked file reading with line reassembly.
//!
//! A file is read as `ceil(size / chunk_size)` consecutive byte ranges.
//! Lines that straddle a range boundary, including multi-byte UTF-8
//! sequences cut in half, are stitched back together, so the produced
//! lines are exactly those of [`str::lines`] over the whole file whatever
//! the chunk size.

use futures::stream::{self, BoxStream, StreamExt};
use snafu::prelude::*;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use crate::emit;
use crate::error::{OpenSnafu, ReadChunkSnafu, ReaderError};
use crate::metrics::events::ChunkRead;
use crate::source::lines::LineDecoder;

/// Reads a file in fixed-size byte ranges and yields whole lines.
#[derive(Debug, Clone)]
pub struct ChunkedReader {
    path: PathBuf,
    chunk_size: u64,
}

impl ChunkedReader {
    /// Create a reader. A `chunk_size` of zero is treated as one byte.
    pub fn new(path: impl Into<PathBuf>, chunk_size: u64) -> Self {
        Self {
            path: path.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of ranges needed to cover `file_size` bytes.
    pub fn chunk_count(&self, file_size: u64) -> u64 {
        file_size.div_ceil(self.chunk_size)
    }

    /// Lazily stream the file's lines. Each call opens the file afresh.
    pub fn lines(&self) -> BoxStream<'static, Result<String, ReaderError>> {
        let state = LineState::new(self.path.clone(), self.chunk_size);
        stream::try_unfold(state, |mut state| async move {
            let line = state.next_line().await?;
            Ok::<_, ReaderError>(line.map(|line| (line, state)))
        })
        .boxed()
    }
}

struct LineState {
    path: PathBuf,
    chunk_size: u64,
    file: Option<File>,
    file_size: u64,
    total_chunks: u64,
    next_chunk: u64,
    decoder: LineDecoder,
    finished: bool,
}

impl LineState {
    fn new(path: PathBuf, chunk_size: u64) -> Self {
        let decoder = LineDecoder::new(path.display().to_string());
        Self {
            path,
            chunk_size,
            file: None,
            file_size: 0,
            total_chunks: 0,
            next_chunk: 0,
            decoder,
            finished: false,
        }
    }

    async fn next_line(&mut self) -> Result<Option<String>, ReaderError> {
        loop {
            if let Some(line) = self.decoder.next_line() {
                return Ok(Some(line));
            }
            if self.finished {
                return Ok(None);
            }
            if self.file.is_none() {
                self.open().await?;
            }
            if self.next_chunk >= self.total_chunks {
                self.decoder.finish(self.next_chunk.saturating_sub(1));
                self.finished = true;
                continue;
            }
            self.read_chunk().await?;
        }
    }

    async fn open(&mut self) -> Result<(), ReaderError> {
        let file = File::open(&self.path).await.context(OpenSnafu {
            path: self.path.clone(),
        })?;
        let metadata = file.metadata().await.context(OpenSnafu {
            path: self.path.clone(),
        })?;

        self.file_size = metadata.len();
        self.total_chunks = self.file_size.div_ceil(self.chunk_size);
        self.file = Some(file);

        debug!(
            path = %self.path.display(),
            size = self.file_size,
            chunk_size = self.chunk_size,
            chunks = self.total_chunks,
            "Opened file for chunked reading"
        );
        Ok(())
    }

    async fn read_chunk(&mut self) -> Result<(), ReaderError> {
        let chunk = self.next_chunk;
        let offset = chunk * self.chunk_size;
        let len = self.chunk_size.min(self.file_size.saturating_sub(offset));
        let context = ReadChunkSnafu {
            path: self.path.clone(),
            chunk,
        };

        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        file.seek(SeekFrom::Start(offset))
            .await
            .context(context.clone())?;
        let mut buf = Vec::with_capacity(len as usize);
        file.take(len)
            .read_to_end(&mut buf)
            .await
            .context(context)?;

        self.next_chunk += 1;
        emit!(ChunkRead {
            bytes: buf.len() as u64
        });

        self.decoder.push(&buf, chunk);
        Ok(())
    }
}
