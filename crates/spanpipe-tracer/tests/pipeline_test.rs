//! End-to-end pipeline tests
//!
//! Drives the producer API (tracer, registry, wrappers, monitor) through a
//! real batch processor into a recording exporter and asserts on what a
//! collector would actually receive.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use spanpipe_core::config::{ConfigBuilder, ConfigHandle, TelemetryConfig};
use spanpipe_core::domain::errors::TelemetryError;
use spanpipe_core::domain::span::{AttributeValue, Span, SpanKind, SpanStatus};
use spanpipe_core::ports::SpanExporter;
use spanpipe_core::redact::REDACTED;
use spanpipe_export::{BatchProcessor, PipelineMetrics};
use spanpipe_tracer::instrument::{trace_async, with_tracing, HttpStatus, TraceRequest};
use spanpipe_tracer::{ErrorMonitor, SpanRegistry, TracedClient, Tracer};

/// Exporter that records every span it receives.
struct RecordingExporter {
    spans: Mutex<Vec<Span>>,
}

impl RecordingExporter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            spans: Mutex::new(Vec::new()),
        })
    }

    fn spans(&self) -> Vec<Span> {
        self.spans.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpanExporter for RecordingExporter {
    fn name(&self) -> &str {
        "recording"
    }

    async fn export(&self, batch: &[Span]) -> Result<(), TelemetryError> {
        self.spans.lock().unwrap().extend_from_slice(batch);
        Ok(())
    }
}

struct TestPipeline {
    tracer: Arc<Tracer>,
    registry: Arc<SpanRegistry>,
    monitor: Arc<ErrorMonitor>,
    batch: Arc<BatchProcessor>,
    exporter: Arc<RecordingExporter>,
}

fn build(config: TelemetryConfig) -> TestPipeline {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();

    let handle = ConfigHandle::new(config);
    let metrics = Arc::new(PipelineMetrics::new().unwrap());
    let exporter = RecordingExporter::new();
    let batch = Arc::new(BatchProcessor::new(
        Arc::clone(&exporter) as Arc<dyn SpanExporter>,
        handle.clone(),
        Arc::clone(&metrics),
    ));
    let tracer = Arc::new(Tracer::new(
        handle,
        None,
        Some(Arc::clone(&batch)),
        metrics,
    ));
    let registry = Arc::new(SpanRegistry::new(Arc::clone(&tracer)));
    let monitor = Arc::new(ErrorMonitor::new(Arc::clone(&tracer)));

    TestPipeline {
        tracer,
        registry,
        monitor,
        batch,
        exporter,
    }
}

fn default_pipeline() -> TestPipeline {
    build(
        ConfigBuilder::new()
            .service_name("moviefinder")
            .enable_console_exporter(false)
            .enable_otlp_exporter(true)
            .build(),
    )
}

fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, AttributeValue> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), AttributeValue::from(*v)))
        .collect()
}

// ============================================================================
// Spec scenario: failed API operation
// ============================================================================

#[tokio::test]
async fn test_failed_api_operation_flows_to_exporter_and_rethrows() {
    let pipeline = default_pipeline();

    let result: Result<(), std::io::Error> = trace_async(
        &pipeline.tracer,
        "tmdb.getPopularMovies",
        attrs(&[("api.operation", "getPopularMovies")]),
        async { Err(std::io::Error::new(std::io::ErrorKind::Other, "HTTP 404")) },
    )
    .await;

    // the original error reaches the caller unchanged
    let error = result.unwrap_err();
    assert_eq!(error.to_string(), "HTTP 404");
    assert_eq!(error.kind(), std::io::ErrorKind::Other);

    pipeline.batch.flush_once().await;

    let spans = pipeline.exporter.spans();
    assert_eq!(spans.len(), 1);
    let span = &spans[0];
    assert_eq!(span.name(), "tmdb.getPopularMovies");
    assert_eq!(span.status(), SpanStatus::Error);
    assert_eq!(span.status_message(), Some("HTTP 404"));
    assert_eq!(span.exception().unwrap().message, "HTTP 404");
    assert_eq!(
        span.attributes()["api.operation"].as_str(),
        Some("getPopularMovies")
    );
    assert_eq!(
        span.attributes()["service.name"].as_str(),
        Some("moviefinder")
    );
}

// ============================================================================
// P1: closure totality
// ============================================================================

struct FakeResponse(Option<u16>);

impl HttpStatus for FakeResponse {
    fn status_code(&self) -> Option<u16> {
        self.0
    }
}

#[tokio::test]
async fn test_every_wrapped_operation_ends_in_exactly_one_terminal_state() {
    let pipeline = default_pipeline();

    // success, HTTP error result, thrown error
    let _ok: Result<FakeResponse, std::io::Error> = with_tracing(
        &pipeline.tracer,
        async { Ok(FakeResponse(Some(200))) },
        TraceRequest::new("op.success"),
    )
    .await;
    let _http_error: Result<FakeResponse, std::io::Error> = with_tracing(
        &pipeline.tracer,
        async { Ok(FakeResponse(Some(500))) },
        TraceRequest::new("op.http_error"),
    )
    .await;
    let _thrown: Result<FakeResponse, std::io::Error> = with_tracing(
        &pipeline.tracer,
        async { Err(std::io::Error::new(std::io::ErrorKind::Other, "boom")) },
        TraceRequest::new("op.thrown"),
    )
    .await;

    pipeline.batch.flush_once().await;

    let spans = pipeline.exporter.spans();
    assert_eq!(spans.len(), 3);
    for span in &spans {
        assert!(span.is_finished(), "span {} left open", span.name());
        assert_ne!(span.status(), SpanStatus::Unset);
    }

    let by_name = |name: &str| {
        spans
            .iter()
            .find(|s| s.name() == name)
            .unwrap_or_else(|| panic!("missing span {name}"))
    };
    assert_eq!(by_name("op.success").status(), SpanStatus::Ok);
    assert_eq!(by_name("op.http_error").status(), SpanStatus::Error);
    assert_eq!(
        by_name("op.http_error").attributes()["http.status_code"],
        AttributeValue::Int(500)
    );
    assert_eq!(by_name("op.thrown").status(), SpanStatus::Error);
}

// ============================================================================
// P4 + P5: registry leak-freedom and queue boundedness
// ============================================================================

#[tokio::test]
async fn test_registry_is_empty_after_clear_regardless_of_leaks() {
    let pipeline = default_pipeline();

    for i in 0..100 {
        pipeline.registry.start_span(
            &format!("leaked-{i}"),
            "op",
            SpanKind::Internal,
            BTreeMap::new(),
        );
    }
    // only a few are ended properly
    for i in 0..10 {
        pipeline.registry.end_span(&format!("leaked-{i}"), BTreeMap::new());
    }

    pipeline.registry.clear_active();
    assert_eq!(pipeline.registry.active_count(), 0);

    pipeline.batch.flush_once().await;
    // only the properly ended spans were exported
    assert_eq!(pipeline.exporter.spans().len(), 10);
}

#[tokio::test]
async fn test_queue_never_exceeds_capacity_and_counts_overflow() {
    let pipeline = build(
        ConfigBuilder::new()
            .enable_console_exporter(false)
            .enable_otlp_exporter(true)
            .batch_max_queue_size(16)
            .batch_max_export_batch_size(16)
            .build(),
    );

    for i in 0..40 {
        let span = pipeline.tracer.start_span(&format!("burst-{i}"), BTreeMap::new());
        pipeline.tracer.end_span(span);
    }

    assert_eq!(pipeline.batch.queue_len(), 16);
    assert_eq!(pipeline.batch.dropped_overflow_count(), 24);
}

// ============================================================================
// Sampling and redaction end to end
// ============================================================================

#[tokio::test]
async fn test_rate_zero_exports_nothing() {
    let pipeline = build(
        ConfigBuilder::new()
            .enable_console_exporter(false)
            .enable_otlp_exporter(true)
            .sampling_rate(0.0)
            .build(),
    );

    for _ in 0..50 {
        let span = pipeline.tracer.start_span("unsampled", BTreeMap::new());
        pipeline.tracer.end_span(span);
    }
    pipeline.batch.flush_once().await;

    assert!(pipeline.exporter.spans().is_empty());
}

#[tokio::test]
async fn test_sensitive_attributes_never_reach_the_exporter() {
    let pipeline = default_pipeline();

    let span = pipeline.tracer.start_span(
        "auth.login",
        attrs(&[("user.token", "abc123"), ("screen.name", "Login")]),
    );
    pipeline
        .tracer
        .end_span_ok(span, attrs(&[("session_id", "s-99")]));

    pipeline.batch.flush_once().await;

    let spans = pipeline.exporter.spans();
    let exported = &spans[0];
    assert_eq!(exported.attributes()["user.token"].as_str(), Some(REDACTED));
    assert_eq!(exported.attributes()["session_id"].as_str(), Some(REDACTED));
    assert_eq!(exported.attributes()["screen.name"].as_str(), Some("Login"));
}

// ============================================================================
// Error monitor end to end
// ============================================================================

#[tokio::test]
async fn test_error_taxonomy_attributes_are_exported() {
    let pipeline = default_pipeline();

    pipeline.monitor.log_api_error(
        &std::io::Error::new(std::io::ErrorKind::Other, "HTTP 500"),
        Some("/movie/popular"),
        BTreeMap::new(),
    );
    pipeline
        .monitor
        .log_ui_error(&std::fmt::Error, Some("MovieCard"), BTreeMap::new());

    pipeline.batch.flush_once().await;

    let spans = pipeline.exporter.spans();
    assert_eq!(spans.len(), 2);

    let api = &spans[0];
    assert_eq!(api.attributes()["error.source"].as_str(), Some("api"));
    assert_eq!(api.attributes()["error.handled"], AttributeValue::Bool(true));
    assert_eq!(
        api.attributes()["api.endpoint"].as_str(),
        Some("/movie/popular")
    );

    let ui = &spans[1];
    assert_eq!(ui.attributes()["error.source"].as_str(), Some("ui"));
    assert_eq!(
        ui.attributes()["ui.component"].as_str(),
        Some("MovieCard")
    );
}

// ============================================================================
// TracedClient against a live mock upstream
// ============================================================================

#[tokio::test]
async fn test_traced_client_traces_real_requests() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/movie/popular"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "results": [] })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/movie/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let pipeline = default_pipeline();
    let client = TracedClient::new(
        Arc::clone(&pipeline.tracer),
        server.uri(),
        attrs(&[("api.provider", "tmdb")]),
    );

    let ok = client.get("/movie/popular").await.unwrap();
    assert_eq!(ok.status().as_u16(), 200);

    // non-2xx stays Ok for the caller; only the span is marked failed
    let not_found = client.get("/movie/missing").await.unwrap();
    assert_eq!(not_found.status().as_u16(), 404);

    pipeline.batch.flush_once().await;
    let spans = pipeline.exporter.spans();
    assert_eq!(spans.len(), 2);

    assert_eq!(spans[0].status(), SpanStatus::Ok);
    assert_eq!(
        spans[0].attributes()["http.status_code"],
        AttributeValue::Int(200)
    );
    assert_eq!(spans[0].attributes()["api.provider"].as_str(), Some("tmdb"));
    assert_eq!(
        spans[0].attributes()["api.endpoint"].as_str(),
        Some("/movie/popular")
    );

    assert_eq!(spans[1].status(), SpanStatus::Error);
    assert_eq!(
        spans[1].attributes()["http.status_code"],
        AttributeValue::Int(404)
    );
    assert_eq!(spans[1].status_message(), Some("HTTP 404"));
}

// ============================================================================
// Shutdown drains
// ============================================================================

#[tokio::test]
async fn test_shutdown_exports_everything_still_queued() {
    let pipeline = build(
        ConfigBuilder::new()
            .enable_console_exporter(false)
            .enable_otlp_exporter(true)
            .batch_scheduled_delay_ms(3_600_000)
            .build(),
    );
    pipeline.batch.start();

    for i in 0..7 {
        let span = pipeline.tracer.start_span(&format!("pending-{i}"), BTreeMap::new());
        pipeline.tracer.end_span(span);
    }
    pipeline.registry.clear_active();
    pipeline.batch.shutdown().await;

    assert_eq!(pipeline.exporter.spans().len(), 7);
}
