//! Integration tests for the OTLP HTTP exporter and batch processor
//!
//! Verifies end-to-end export behavior against a wiremock-based collector:
//! payload shape, collector failures, per-flush timeouts and runtime
//! endpoint updates.

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use spanpipe_core::config::{ConfigBuilder, ConfigHandle, ConfigUpdate, RetryPolicy};
use spanpipe_core::domain::span::{ExceptionInfo, Span, SpanKind};
use spanpipe_core::ports::SpanExporter;
use spanpipe_export::{BatchProcessor, OtlpHttpExporter, PipelineMetrics};

async fn collector() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/traces"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

fn config_for(endpoint: &str) -> ConfigHandle {
    ConfigHandle::new(
        ConfigBuilder::new()
            .service_name("moviefinder")
            .service_version("1.2.3")
            .enable_console_exporter(false)
            .enable_otlp_exporter(true)
            .export_endpoint(endpoint)
            .build(),
    )
}

fn finished_span(name: &str) -> Span {
    let mut span = Span::new(name, SpanKind::Api);
    span.set_attribute("http.method", "GET");
    span.end();
    span
}

#[tokio::test]
async fn test_export_posts_expected_payload_shape() {
    let server = collector().await;
    let exporter = OtlpHttpExporter::new(config_for(&server.uri()));

    let mut error_span = Span::new("tmdb.getMovieDetail", SpanKind::Api);
    error_span.end_with_error(ExceptionInfo::new("Error", "HTTP 404"));

    exporter
        .export(&[finished_span("tmdb.getPopularMovies"), error_span])
        .await
        .expect("export failed");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);

    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let resource = &body["resourceSpans"][0];
    assert_eq!(
        resource["resource"]["attributes"]["service.name"],
        "moviefinder"
    );

    let spans = resource["scopeSpans"][0]["spans"].as_array().unwrap();
    assert_eq!(spans.len(), 2);
    assert_eq!(spans[0]["name"], "tmdb.getPopularMovies");
    assert_eq!(spans[0]["status"]["code"], 1);
    assert_eq!(spans[0]["attributes"]["http.method"], "GET");
    assert_eq!(spans[1]["status"]["code"], 2);
    assert_eq!(spans[1]["status"]["message"], "HTTP 404");
    assert_eq!(spans[1]["exception"]["message"], "HTTP 404");
    assert!(spans[0]["traceId"].as_str().unwrap().len() == 32);
    assert!(spans[0]["spanId"].as_str().unwrap().len() == 16);
}

#[tokio::test]
async fn test_export_fails_on_collector_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/traces"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let exporter = OtlpHttpExporter::new(config_for(&server.uri()));
    let result = exporter.export(&[finished_span("op")]).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_batch_processor_flushes_to_collector() {
    let server = collector().await;
    let config = config_for(&server.uri());
    let metrics = Arc::new(PipelineMetrics::new().unwrap());
    let processor = Arc::new(BatchProcessor::new(
        Arc::new(OtlpHttpExporter::new(config.clone())),
        config,
        Arc::clone(&metrics),
    ));

    for i in 0..3 {
        processor.enqueue(finished_span(&format!("span-{i}")));
    }
    processor.flush_once().await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);

    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let spans = body["resourceSpans"][0]["scopeSpans"][0]["spans"]
        .as_array()
        .unwrap();
    assert_eq!(spans.len(), 3);

    assert_eq!(
        metrics
            .spans_exported_total
            .with_label_values(&["otlp"])
            .get(),
        3
    );
}

#[tokio::test]
async fn test_flush_timeout_drops_batch_after_one_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/traces"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let config = ConfigHandle::new(
        ConfigBuilder::new()
            .enable_otlp_exporter(true)
            .export_endpoint(server.uri())
            .batch_export_timeout_ms(100)
            .batch_retry(RetryPolicy::None)
            .build(),
    );
    let metrics = Arc::new(PipelineMetrics::new().unwrap());
    let processor = Arc::new(BatchProcessor::new(
        Arc::new(OtlpHttpExporter::new(config.clone())),
        config,
        Arc::clone(&metrics),
    ));

    processor.enqueue(finished_span("slow"));
    processor.flush_once().await;

    // one attempt, then the batch is gone; nothing retries it
    assert_eq!(processor.queue_len(), 0);
    assert_eq!(
        metrics
            .export_failures_total
            .with_label_values(&["otlp"])
            .get(),
        1
    );
    assert_eq!(
        metrics
            .spans_dropped_total
            .with_label_values(&["export_timeout"])
            .get(),
        1
    );
}

#[tokio::test]
async fn test_offline_collector_does_not_disturb_producers() {
    // Nothing is listening on this endpoint at all.
    let config = ConfigHandle::new(
        ConfigBuilder::new()
            .enable_otlp_exporter(true)
            .export_endpoint("http://127.0.0.1:9")
            .batch_export_timeout_ms(500)
            .build(),
    );
    let metrics = Arc::new(PipelineMetrics::new().unwrap());
    let processor = Arc::new(BatchProcessor::new(
        Arc::new(OtlpHttpExporter::new(config.clone())),
        config,
        Arc::clone(&metrics),
    ));

    processor.enqueue(finished_span("offline"));
    processor.flush_once().await;

    // the failed batch is dropped; enqueueing keeps working
    assert_eq!(processor.queue_len(), 0);
    processor.enqueue(finished_span("next"));
    assert_eq!(processor.queue_len(), 1);
}

#[tokio::test]
async fn test_runtime_endpoint_update_redirects_export() {
    let first = collector().await;
    let second = collector().await;

    let config = config_for(&first.uri());
    let exporter = OtlpHttpExporter::new(config.clone());

    exporter.export(&[finished_span("to-first")]).await.unwrap();

    config.update(ConfigUpdate {
        export_endpoint: Some(second.uri()),
        ..ConfigUpdate::default()
    });
    exporter
        .export(&[finished_span("to-second")])
        .await
        .unwrap();

    assert_eq!(first.received_requests().await.unwrap().len(), 1);
    assert_eq!(second.received_requests().await.unwrap().len(), 1);
}
