//! HTTP API destination.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use snafu::prelude::*;

use super::Destination;
use crate::config::HttpMethod;
use crate::error::{SinkError, SinkHttpSnafu, SinkStatusSnafu};
use crate::pipeline::RunContext;
use crate::record::Record;

#[derive(Serialize)]
struct Envelope<'a> {
    data: &'a Record,
}

/// Sends each record as `{"data": record}` to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpSink {
    name: String,
    url: String,
    method: HttpMethod,
    headers: IndexMap<String, String>,
}

impl HttpSink {
    pub fn new(url: impl Into<String>, method: HttpMethod) -> Self {
        let url = url.into();
        Self {
            name: format!("http:{url}"),
            url,
            method,
            headers: IndexMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: IndexMap<String, String>) -> Self {
        self.headers = headers;
        self
    }
}

#[async_trait]
impl Destination for HttpSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, record: &Record, ctx: &RunContext) -> Result<(), SinkError> {
        let client = ctx.client();
        let mut request = match self.method {
            HttpMethod::Post => client.post(&self.url),
            HttpMethod::Put => client.put(&self.url),
        };
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .json(&Envelope { data: record })
            .send()
            .await
            .context(SinkHttpSnafu { url: &self.url })?;

        let status = response.status();
        ensure!(
            !status.is_client_error() && !status.is_server_error(),
            SinkStatusSnafu {
                url: &self.url,
                status: status.as_u16()
            }
        );
        Ok(())
    }
}
