//! HTTP source and destination tests against a mock server.

use futures::{StreamExt, TryStreamExt};
use indexmap::IndexMap;
use serde_json::json;
use sluice::config::{HttpFormat, HttpMethod, PipelineConfig, RetryConfig};
use sluice::error::{SinkError, SourceError};
use sluice::sink::{Destination, HttpSink};
use sluice::source::{HttpSource, Source};
use sluice::{Pipeline, Record, RunContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, header, method, path},
};

// ============================================================================
// Source
// ============================================================================

#[tokio::test]
async fn test_json_array_becomes_records() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": 1}, {"id": 2}, "loose"])),
        )
        .mount(&mock_server)
        .await;

    let source = HttpSource::new(format!("{}/feed", mock_server.uri()), HttpFormat::Json);
    let records: Vec<Record> = source
        .open(&RunContext::default())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(records[0].get("id"), Some(&json!(1)));
    assert_eq!(records[2].get("value"), Some(&json!("loose")));
}

#[tokio::test]
async fn test_jsonl_skips_malformed_lines() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("{\"n\":1}\n\nnot json\n{\"n\":2}\n"),
        )
        .mount(&mock_server)
        .await;

    let source = HttpSource::new(format!("{}/events", mock_server.uri()), HttpFormat::Jsonl);
    let records: Vec<Record> = source
        .open(&RunContext::default())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    let values: Vec<_> = records.iter().map(|r| r.get("n").cloned()).collect();
    assert_eq!(values, vec![Some(json!(1)), Some(json!(2))]);
}

#[tokio::test]
async fn test_jsonl_yields_before_feed_closes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Sends one chunked line and then holds the connection open.
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0_u8; 1024];
        let _ = socket.read(&mut request).await.unwrap();
        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n9\r\n{\"id\":1}\n\r\n",
            )
            .await
            .unwrap();
        socket.flush().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let source = HttpSource::new(format!("http://{addr}/live"), HttpFormat::Jsonl);
    let first = tokio::time::timeout(Duration::from_secs(3), async {
        let mut records = source.open(&RunContext::default()).await.unwrap();
        records.next().await
    })
    .await
    .expect("first record should arrive while the feed is still open");

    let record = first.unwrap().unwrap();
    assert_eq!(record.get("id"), Some(&json!(1)));
    server.abort();
}

#[tokio::test]
async fn test_source_error_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let source = HttpSource::new(mock_server.uri(), HttpFormat::Json);
    let result = source.open(&RunContext::default()).await;

    assert!(matches!(
        result,
        Err(SourceError::SourceStatus { status: 503, .. })
    ));
}

// ============================================================================
// Destination
// ============================================================================

#[tokio::test]
async fn test_sink_posts_envelope_with_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ingest"))
        .and(header("x-api-key", "secret"))
        .and(body_json(json!({"data": {"line": "hello"}})))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut headers = IndexMap::new();
    headers.insert("x-api-key".to_string(), "secret".to_string());
    let sink = HttpSink::new(format!("{}/ingest", mock_server.uri()), HttpMethod::Post)
        .with_headers(headers);

    sink.send(&Record::from_line("hello"), &RunContext::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_sink_put() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let sink = HttpSink::new(format!("{}/items", mock_server.uri()), HttpMethod::Put);
    sink.send(&Record::from_line("x"), &RunContext::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_sink_error_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let sink = HttpSink::new(mock_server.uri(), HttpMethod::Post);
    let result = sink
        .send(&Record::from_line("x"), &RunContext::default())
        .await;

    assert!(matches!(
        result,
        Err(SinkError::SinkStatus { status: 500, .. })
    ));
}

// ============================================================================
// Pipeline
// ============================================================================

#[tokio::test]
async fn test_feed_to_api_retries_server_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "a"}])))
        .mount(&mock_server)
        .await;

    // First delivery attempt fails, the retry succeeds.
    Mock::given(method("POST"))
        .and(path("/ingest"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ingest"))
        .and(body_json(json!({"data": {"id": "a"}})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = PipelineConfig {
        retry: RetryConfig {
            attempts: 3,
            delay_secs: 0.0,
        },
        ..Default::default()
    };
    let stats = Pipeline::builder(config)
        .source(Arc::new(HttpSource::new(
            format!("{}/feed", mock_server.uri()),
            HttpFormat::Json,
        )))
        .destination(Arc::new(HttpSink::new(
            format!("{}/ingest", mock_server.uri()),
            HttpMethod::Post,
        )))
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(stats.records_dispatched, 1);
    assert_eq!(stats.delivery_failures, 0);
    assert_eq!(stats.monitor.warnings, 1);
}
