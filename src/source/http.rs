//! Remote HTTP feed source.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use snafu::prelude::*;
use tracing::debug;

use super::lines::LineDecoder;
use super::{RecordStream, Source, parse_json_line, records_from_document};
use crate::config::HttpFormat;
use crate::error::{SourceError, SourceHttpSnafu, SourceJsonSnafu, SourceStatusSnafu};
use crate::pipeline::RunContext;
use crate::record::Record;

/// Fetches a JSON or JSON-lines document with a GET request.
///
/// JSON-lines bodies are consumed as they arrive, so a feed that never
/// closes still yields each record once its line is complete.
#[derive(Debug, Clone)]
pub struct HttpSource {
    name: String,
    url: String,
    format: HttpFormat,
}

impl HttpSource {
    pub fn new(url: impl Into<String>, format: HttpFormat) -> Self {
        let url = url.into();
        Self {
            name: format!("http:{url}"),
            url,
            format,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Source for HttpSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self, ctx: &RunContext) -> Result<RecordStream, SourceError> {
        let response = ctx
            .client()
            .get(&self.url)
            .send()
            .await
            .context(SourceHttpSnafu { url: &self.url })?;

        let status = response.status();
        ensure!(
            !status.is_client_error() && !status.is_server_error(),
            SourceStatusSnafu {
                url: &self.url,
                status: status.as_u16()
            }
        );

        match self.format {
            HttpFormat::Json => {
                let body = response
                    .text()
                    .await
                    .context(SourceHttpSnafu { url: &self.url })?;
                debug!(url = %self.url, bytes = body.len(), "Fetched feed");

                let document: Value = serde_json::from_str(&body).context(SourceJsonSnafu {
                    origin: self.name.clone(),
                })?;
                let records = records_from_document(document);
                Ok(stream::iter(records.into_iter().map(Ok)).boxed())
            }
            HttpFormat::Jsonl => {
                debug!(url = %self.url, "Streaming feed");
                let lines = JsonLines {
                    body: response.bytes_stream().boxed(),
                    decoder: LineDecoder::new(self.name.clone()),
                    url: self.url.clone(),
                    origin: self.name.clone(),
                    chunk: 0,
                    done: false,
                };
                Ok(stream::try_unfold(lines, |mut lines| async move {
                    let record = lines.next_record().await?;
                    Ok::<_, SourceError>(record.map(|record| (record, lines)))
                })
                .boxed())
            }
        }
    }
}

/// Incremental JSON-lines decoding over a response body.
struct JsonLines<B> {
    body: BoxStream<'static, Result<B, reqwest::Error>>,
    decoder: LineDecoder,
    url: String,
    origin: String,
    chunk: u64,
    done: bool,
}

impl<B: AsRef<[u8]>> JsonLines<B> {
    async fn next_record(&mut self) -> Result<Option<Record>, SourceError> {
        loop {
            while let Some(line) = self.decoder.next_line() {
                if let Some(record) = parse_json_line(&line, &self.origin) {
                    return Ok(Some(record));
                }
            }
            if self.done {
                return Ok(None);
            }
            match self.body.next().await {
                Some(bytes) => {
                    let bytes = bytes.context(SourceHttpSnafu { url: &self.url })?;
                    self.decoder.push(bytes.as_ref(), self.chunk);
                    self.chunk += 1;
                }
                None => {
                    self.decoder.finish(self.chunk.saturating_sub(1));
                    self.done = true;
                }
            }
        }
    }
}
