//! Span lifecycle manager
//!
//! The [`Tracer`] is the single producer-facing entry point for span
//! creation and completion. On start it mints identifiers, evaluates the
//! sampling decision once, attaches the service identity and sanitizes
//! caller attributes; on end it merges final attributes and hands the
//! closed span to the enabled sinks (console immediately, batch queue for
//! network export).
//!
//! Telemetry failures never propagate to the caller. Malformed producer
//! input trips a `debug_assert!` so programming errors surface loudly in
//! development builds; release builds degrade to a counted warning.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use spanpipe_core::config::ConfigHandle;
use spanpipe_core::domain::span::{AttributeValue, ExceptionInfo, Span, SpanKind};
use spanpipe_core::redact::redact_in_place;
use spanpipe_core::sampler::should_sample;
use spanpipe_export::{BatchProcessor, ConsoleExporter, PipelineMetrics};

/// Creates, completes and dispatches spans.
pub struct Tracer {
    config: ConfigHandle,
    console: Option<Arc<ConsoleExporter>>,
    batch: Option<Arc<BatchProcessor>>,
    metrics: Arc<PipelineMetrics>,
}

impl Tracer {
    /// Create a tracer dispatching to the given sinks. Either sink may be
    /// absent (tests, tools); the enable flags in the live config decide
    /// per span whether a present sink receives it.
    pub fn new(
        config: ConfigHandle,
        console: Option<Arc<ConsoleExporter>>,
        batch: Option<Arc<BatchProcessor>>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            config,
            console,
            batch,
            metrics,
        }
    }

    /// The live configuration handle this tracer reads.
    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    // ========================================================================
    // Span creation
    // ========================================================================

    /// Start a root span of kind `internal`.
    pub fn start_span(
        &self,
        name: &str,
        attributes: BTreeMap<String, AttributeValue>,
    ) -> Span {
        self.start_span_kind(name, SpanKind::Internal, attributes)
    }

    /// Start a root span of an explicit kind.
    pub fn start_span_kind(
        &self,
        name: &str,
        kind: SpanKind,
        attributes: BTreeMap<String, AttributeValue>,
    ) -> Span {
        let name = self.validated_name(name);
        let sampled = self
            .config
            .read(|c| should_sample(c.sampling_rate));
        let span = Span::new(name, kind).with_sampled(sampled);
        self.populate(span, attributes)
    }

    /// Start a child span inheriting trace identity and sampling decision
    /// from `parent`.
    pub fn start_child_span(
        &self,
        name: &str,
        kind: SpanKind,
        attributes: BTreeMap<String, AttributeValue>,
        parent: &Span,
    ) -> Span {
        let name = self.validated_name(name);
        let span = Span::child_of(name, kind, parent);
        self.populate(span, attributes)
    }

    /// Attach service identity and sanitized caller attributes; unsampled
    /// spans skip all of it (the cheap no-op path).
    fn populate(&self, mut span: Span, mut attributes: BTreeMap<String, AttributeValue>) -> Span {
        if !span.is_sampled() {
            return span;
        }

        let (service_name, service_version, environment) = self.config.read(|c| {
            (
                c.service_name.clone(),
                c.service_version.clone(),
                c.environment,
            )
        });
        span.set_attribute("service.name", service_name);
        span.set_attribute("service.version", service_version);
        span.set_attribute("deployment.environment", environment.to_string());

        redact_in_place(&mut attributes);
        span.set_attributes(attributes);
        span
    }

    // ========================================================================
    // Span completion
    // ========================================================================

    /// Close a span with status `ok` and dispatch it.
    pub fn end_span(&self, mut span: Span) {
        span.end();
        self.finish(span);
    }

    /// Close a span with status `ok`, merging final attributes first.
    pub fn end_span_ok(
        &self,
        mut span: Span,
        mut extra_attributes: BTreeMap<String, AttributeValue>,
    ) {
        redact_in_place(&mut extra_attributes);
        span.set_attributes(extra_attributes);
        span.end();
        self.finish(span);
    }

    /// Close a span with status `error`, recording the failure as a
    /// normalized exception.
    pub fn end_span_with_error<E: std::fmt::Display + ?Sized>(
        &self,
        span: Span,
        error: &E,
        extra_attributes: BTreeMap<String, AttributeValue>,
    ) {
        self.end_span_with_exception(span, ExceptionInfo::from_error(error), extra_attributes);
    }

    /// Close a span with status `error` and pre-built exception details.
    pub fn end_span_with_exception(
        &self,
        mut span: Span,
        exception: ExceptionInfo,
        mut extra_attributes: BTreeMap<String, AttributeValue>,
    ) {
        redact_in_place(&mut extra_attributes);
        span.set_attributes(extra_attributes);
        span.end_with_error(exception);
        self.finish(span);
    }

    /// Fire-and-forget error logging outside any traced operation:
    /// synthesizes a short-lived span purely to carry the exception and
    /// closes it immediately.
    pub fn record_exception<E: std::fmt::Display + ?Sized>(
        &self,
        error: &E,
        attributes: BTreeMap<String, AttributeValue>,
    ) {
        let span = self.start_span_kind("exception", SpanKind::Internal, attributes);
        self.end_span_with_error(span, error, BTreeMap::new());
    }

    /// Record an exception as an event on a still-open span, without
    /// closing it.
    pub fn record_exception_on<E: std::fmt::Display + ?Sized>(
        &self,
        span: &mut Span,
        error: &E,
    ) {
        let exception = ExceptionInfo::from_error(error);
        let mut attributes = BTreeMap::new();
        attributes.insert(
            "exception.type".to_string(),
            AttributeValue::from(exception.error_type.as_str()),
        );
        attributes.insert(
            "exception.message".to_string(),
            AttributeValue::from(exception.message.as_str()),
        );
        span.add_event_with_attributes("exception", attributes);
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Hand a closed span to the enabled sinks. All failures stop here.
    fn finish(&self, span: Span) {
        if !span.is_sampled() {
            self.metrics.record_dropped("unsampled", 1);
            return;
        }

        let (console_enabled, otlp_enabled) = self
            .config
            .read(|c| (c.enable_console_exporter, c.enable_otlp_exporter));

        if console_enabled {
            if let Some(console) = &self.console {
                if let Err(e) = console.write_span(&span) {
                    self.metrics.internal_errors_total.inc();
                    warn!(error = %e, "Console span write failed");
                }
            }
        }

        if otlp_enabled {
            if let Some(batch) = &self.batch {
                batch.enqueue(span);
            }
        }
    }

    /// Reject empty span names: loud in development builds, a counted
    /// warning plus fallback name in release.
    fn validated_name(&self, name: &str) -> String {
        if name.trim().is_empty() {
            debug_assert!(false, "span name must not be empty");
            self.metrics.internal_errors_total.inc();
            warn!("Empty span name, substituting \"unnamed\"");
            return "unnamed".to_string();
        }
        name.to_string()
    }
}
