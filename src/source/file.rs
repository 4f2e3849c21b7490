//! Local file source.
//!
//! Line-based formats (`lines`, `jsonl`) go through the [`ChunkedReader`]
//! when the file is larger than the multipart threshold, and through a
//! buffered line reader otherwise. Both produce the same lines.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde_json::Value;
use snafu::prelude::*;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use super::{ChunkedReader, RecordStream, Source, parse_json_line, records_from_document};
use crate::config::{FileFormat, MultipartConfig};
use crate::error::{SourceCsvSnafu, SourceError, SourceIoSnafu, SourceJsonSnafu};
use crate::pipeline::RunContext;
use crate::record::Record;

type LineStream = BoxStream<'static, Result<String, SourceError>>;

#[derive(Debug, Clone)]
pub struct FileSource {
    name: String,
    path: PathBuf,
    format: FileFormat,
    delimiter: u8,
    has_headers: bool,
    multipart: MultipartConfig,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>, format: FileFormat) -> Self {
        let path = path.into();
        Self {
            name: format!("file:{}", path.display()),
            path,
            format,
            delimiter: b',',
            has_headers: true,
            multipart: MultipartConfig::default(),
        }
    }

    pub fn with_csv_options(mut self, delimiter: u8, has_headers: bool) -> Self {
        self.delimiter = delimiter;
        self.has_headers = has_headers;
        self
    }

    pub fn with_multipart(mut self, multipart: MultipartConfig) -> Self {
        self.multipart = multipart;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lines(&self, size: u64) -> LineStream {
        if self.multipart.applies_to(size) {
            debug!(
                path = %self.path.display(),
                size,
                chunk_size = self.multipart.chunk_size_bytes,
                "Reading file in chunks"
            );
            ChunkedReader::new(&self.path, self.multipart.chunk_size_bytes)
                .lines()
                .map_err(|source| SourceError::Chunked { source })
                .boxed()
        } else {
            buffered_lines(self.path.clone())
        }
    }

    async fn read_all(&self) -> Result<Vec<u8>, SourceError> {
        tokio::fs::read(&self.path).await.context(SourceIoSnafu {
            path: self.path.clone(),
        })
    }

    fn csv_records(&self, bytes: &[u8]) -> Vec<Result<Record, SourceError>> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(self.has_headers)
            .flexible(true)
            .from_reader(bytes);

        let headers: Option<Vec<String>> = if self.has_headers {
            match reader.headers() {
                Ok(headers) => Some(headers.iter().map(str::to_string).collect()),
                Err(source) => {
                    return vec![Err(source).context(SourceCsvSnafu {
                        path: self.path.clone(),
                    })];
                }
            }
        } else {
            None
        };

        reader
            .records()
            .map(|row| -> Result<Record, SourceError> {
                let row = row.context(SourceCsvSnafu {
                    path: self.path.clone(),
                })?;
                Ok(row
                    .iter()
                    .enumerate()
                    .map(|(i, value)| {
                        let name = headers
                            .as_ref()
                            .and_then(|h| h.get(i).cloned())
                            .unwrap_or_else(|| format!("column_{}", i + 1));
                        (name, Value::String(value.to_string()))
                    })
                    .collect())
            })
            .collect()
    }
}

#[async_trait]
impl Source for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self, _ctx: &RunContext) -> Result<RecordStream, SourceError> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .context(SourceIoSnafu {
                path: self.path.clone(),
            })?;
        let size = metadata.len();

        match self.format {
            FileFormat::Lines => Ok(self.lines(size).map_ok(Record::from_line).boxed()),
            FileFormat::Jsonl => {
                let origin = self.name.clone();
                Ok(self
                    .lines(size)
                    .try_filter_map(move |line| {
                        let record = parse_json_line(&line, &origin);
                        async move { Ok(record) }
                    })
                    .boxed())
            }
            FileFormat::Csv => {
                let bytes = self.read_all().await?;
                Ok(stream::iter(self.csv_records(&bytes)).boxed())
            }
            FileFormat::Json => {
                let bytes = self.read_all().await?;
                let document: Value = serde_json::from_slice(&bytes).context(SourceJsonSnafu {
                    origin: self.name.clone(),
                })?;
                let records = records_from_document(document);
                Ok(stream::iter(records.into_iter().map(Ok)).boxed())
            }
        }
    }
}

/// Stream a file's lines through a buffered reader, decoding lossily.
fn buffered_lines(path: PathBuf) -> LineStream {
    stream::try_unfold((path, None), |(path, reader)| async move {
        next_buffered_line(path, reader).await
    })
    .boxed()
}

type BufferedState = (PathBuf, Option<BufReader<File>>);

async fn next_buffered_line(
    path: PathBuf,
    reader: Option<BufReader<File>>,
) -> Result<Option<(String, BufferedState)>, SourceError> {
    let mut reader = match reader {
        Some(reader) => reader,
        None => {
            let file = File::open(&path).await.context(SourceIoSnafu { path: path.clone() })?;
            BufReader::new(file)
        }
    };

    let mut buf = Vec::new();
    let read = reader
        .read_until(b'\n', &mut buf)
        .await
        .context(SourceIoSnafu { path: path.clone() })?;
    if read == 0 {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }

    let line = match String::from_utf8_lossy(&buf) {
        Cow::Borrowed(line) => line.to_string(),
        Cow::Owned(line) => {
            warn!(path = %path.display(), "Replaced invalid UTF-8 in line");
            line
        }
    };
    Ok(Some((line, (path, Some(reader)))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    async fn read(source: &FileSource) -> Vec<Record> {
        source
            .open(&RunContext::default())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap()
    }

    fn chunked(chunk_size: u64) -> MultipartConfig {
        MultipartConfig {
            enabled: true,
            threshold_bytes: 0,
            chunk_size_bytes: chunk_size,
        }
    }

    #[tokio::test]
    async fn test_lines_buffered_and_chunked_agree() {
        let file = write_temp("a\r\nbb\nccc");
        let buffered = FileSource::new(file.path(), FileFormat::Lines);
        let chunked = FileSource::new(file.path(), FileFormat::Lines).with_multipart(chunked(2));

        let expected: Vec<Record> = ["a", "bb", "ccc"].into_iter().map(Record::from_line).collect();
        assert_eq!(read(&buffered).await, expected);
        assert_eq!(read(&chunked).await, expected);
    }

    #[tokio::test]
    async fn test_jsonl_skips_blank_and_malformed() {
        let file = write_temp("{\"id\": 1}\n\nnot json\n{\"id\": 2}\n");
        let source = FileSource::new(file.path(), FileFormat::Jsonl);

        let records = read(&source).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("id"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_csv_with_and_without_headers() {
        let file = write_temp("name;age\nann;31\nbob;42\n");
        let source = FileSource::new(file.path(), FileFormat::Csv).with_csv_options(b';', true);
        let records = read(&source).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("name"), Some(&json!("ann")));
        assert_eq!(records[1].get("age"), Some(&json!("42")));

        let file = write_temp("x,y\n");
        let source = FileSource::new(file.path(), FileFormat::Csv).with_csv_options(b',', false);
        let records = read(&source).await;
        assert_eq!(records[0].get("column_1"), Some(&json!("x")));
        assert_eq!(records[0].get("column_2"), Some(&json!("y")));
    }

    #[tokio::test]
    async fn test_json_document() {
        let file = write_temp(r#"[{"id": "a"}, {"id": "b"}]"#);
        let source = FileSource::new(file.path(), FileFormat::Json);
        assert_eq!(read(&source).await.len(), 2);

        let bad = write_temp("{");
        let source = FileSource::new(bad.path(), FileFormat::Json);
        assert!(matches!(
            source.open(&RunContext::default()).await,
            Err(SourceError::SourceJson { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_file_fails_open() {
        let source = FileSource::new("/nonexistent/sluice.txt", FileFormat::Lines);
        assert!(matches!(
            source.open(&RunContext::default()).await,
            Err(SourceError::SourceIo { .. })
        ));
    }

    #[tokio::test]
    async fn test_open_restarts_from_beginning() {
        let file = write_temp("one\ntwo\n");
        let source = FileSource::new(file.path(), FileFormat::Lines);
        assert_eq!(read(&source).await.len(), 2);
        assert_eq!(read(&source).await.len(), 2);
    }
}
