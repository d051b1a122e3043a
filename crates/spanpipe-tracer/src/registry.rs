//! Keyed live-span registry
//!
//! Some traced operations start and end in different callback contexts
//! (button press → async completion). The registry correlates them through
//! a caller-supplied string key: `start_span(key, …)` parks the open span,
//! `end_span(key)` / `record_error(key, …)` retrieves and closes it.
//!
//! Abandoned entries are bounded by [`clear_active`](SpanRegistry::clear_active),
//! which discards (does not export) everything — callers invoke it on
//! teardown so a missed end call cannot leak forever. There is no
//! timer-based reaping.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::warn;

use spanpipe_core::domain::span::{AttributeValue, Span, SpanKind};

use crate::tracer::Tracer;

/// Maps caller-supplied correlation keys to live spans.
pub struct SpanRegistry {
    tracer: Arc<Tracer>,
    active: DashMap<String, Span>,
}

impl SpanRegistry {
    /// Create a registry backed by the given tracer.
    pub fn new(tracer: Arc<Tracer>) -> Self {
        Self {
            tracer,
            active: DashMap::new(),
        }
    }

    /// Start a span and park it under `key`. If the key is already in use
    /// the previous span is discarded with a warning — losing one span
    /// beats leaking it.
    pub fn start_span(
        &self,
        key: &str,
        name: &str,
        kind: SpanKind,
        attributes: BTreeMap<String, AttributeValue>,
    ) {
        let span = self.tracer.start_span_kind(name, kind, attributes);
        if self.active.insert(key.to_string(), span).is_some() {
            warn!(key, "Replacing live span under an existing correlation key");
        }
    }

    /// Close the span parked under `key` with status `ok`, merging final
    /// attributes. Returns `false` (after a warning) when the key has no
    /// live span — a duplicate end call or a never-started operation.
    pub fn end_span(&self, key: &str, extra_attributes: BTreeMap<String, AttributeValue>) -> bool {
        match self.active.remove(key) {
            Some((_, span)) => {
                self.tracer.end_span_ok(span, extra_attributes);
                true
            }
            None => {
                warn!(key, "end_span for unknown correlation key");
                false
            }
        }
    }

    /// Close the span parked under `key` with status `error`. When the key
    /// has no live span the error is still captured as a standalone
    /// exception record rather than lost.
    pub fn record_error<E: std::fmt::Display + ?Sized>(&self, key: &str, error: &E) -> bool {
        match self.active.remove(key) {
            Some((_, span)) => {
                self.tracer
                    .end_span_with_error(span, error, BTreeMap::new());
                true
            }
            None => {
                warn!(key, "record_error for unknown correlation key");
                let mut attributes = BTreeMap::new();
                attributes.insert(
                    "correlation.key".to_string(),
                    AttributeValue::from(key),
                );
                self.tracer.record_exception(error, attributes);
                false
            }
        }
    }

    /// Attach an attribute to the live span under `key`, if any.
    pub fn set_attribute(
        &self,
        key: &str,
        attr_key: &str,
        value: impl Into<AttributeValue>,
    ) -> bool {
        match self.active.get_mut(key) {
            Some(mut entry) => {
                entry.set_attribute(attr_key, value);
                true
            }
            None => false,
        }
    }

    /// Discard every live span without exporting it. Called on unmount or
    /// teardown to bound memory.
    pub fn clear_active(&self) {
        let count = self.active.len();
        self.active.clear();
        if count > 0 {
            tracing::debug!(count, "Cleared live spans from registry");
        }
    }

    /// Number of live spans currently parked.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use spanpipe_core::config::{ConfigBuilder, ConfigHandle, TelemetryConfig};
    use spanpipe_core::domain::errors::TelemetryError;
    use spanpipe_core::ports::SpanExporter;
    use spanpipe_export::{BatchProcessor, PipelineMetrics};

    use super::*;

    struct NullExporter;

    #[async_trait::async_trait]
    impl SpanExporter for NullExporter {
        fn name(&self) -> &str {
            "null"
        }
        async fn export(&self, _batch: &[Span]) -> Result<(), TelemetryError> {
            Ok(())
        }
    }

    fn registry_with_batch(config: TelemetryConfig) -> (SpanRegistry, Arc<BatchProcessor>) {
        let handle = ConfigHandle::new(config);
        let metrics = Arc::new(PipelineMetrics::new().unwrap());
        let batch = Arc::new(BatchProcessor::new(
            Arc::new(NullExporter),
            handle.clone(),
            Arc::clone(&metrics),
        ));
        let tracer = Arc::new(Tracer::new(
            handle,
            None,
            Some(Arc::clone(&batch)),
            metrics,
        ));
        (SpanRegistry::new(tracer), batch)
    }

    fn otlp_only_config() -> TelemetryConfig {
        ConfigBuilder::new()
            .enable_console_exporter(false)
            .enable_otlp_exporter(true)
            .build()
    }

    #[test]
    fn test_start_end_roundtrip_exports_span() {
        let (registry, batch) = registry_with_batch(otlp_only_config());

        registry.start_span(
            "screen-load-movieDetail",
            "screen.movieDetail",
            SpanKind::ScreenLoad,
            BTreeMap::new(),
        );
        assert_eq!(registry.active_count(), 1);

        assert!(registry.end_span("screen-load-movieDetail", BTreeMap::new()));
        assert_eq!(registry.active_count(), 0);
        assert_eq!(batch.queue_len(), 1);
    }

    #[test]
    fn test_double_end_is_safe_and_does_not_enqueue_twice() {
        let (registry, batch) = registry_with_batch(otlp_only_config());

        registry.start_span("k", "op", SpanKind::Internal, BTreeMap::new());
        assert!(registry.end_span("k", BTreeMap::new()));
        assert!(!registry.end_span("k", BTreeMap::new()));

        assert_eq!(batch.queue_len(), 1);
    }

    #[test]
    fn test_record_error_closes_with_error() {
        let (registry, batch) = registry_with_batch(otlp_only_config());

        registry.start_span("k", "api.call", SpanKind::Api, BTreeMap::new());
        let error = std::io::Error::new(std::io::ErrorKind::Other, "HTTP 500");
        assert!(registry.record_error("k", &error));

        assert_eq!(registry.active_count(), 0);
        assert_eq!(batch.queue_len(), 1);
    }

    #[test]
    fn test_record_error_without_key_still_captures_exception() {
        let (registry, batch) = registry_with_batch(otlp_only_config());

        let error = std::io::Error::new(std::io::ErrorKind::Other, "orphan");
        assert!(!registry.record_error("never-started", &error));

        // captured as a standalone exception span
        assert_eq!(batch.queue_len(), 1);
    }

    #[test]
    fn test_clear_active_discards_without_export() {
        let (registry, batch) = registry_with_batch(otlp_only_config());

        for i in 0..50 {
            registry.start_span(
                &format!("key-{i}"),
                "op",
                SpanKind::Internal,
                BTreeMap::new(),
            );
        }
        assert_eq!(registry.active_count(), 50);

        registry.clear_active();

        assert_eq!(registry.active_count(), 0);
        assert_eq!(batch.queue_len(), 0);
    }

    #[test]
    fn test_duplicate_key_replaces_previous_span() {
        let (registry, _batch) = registry_with_batch(otlp_only_config());

        registry.start_span("k", "first", SpanKind::Internal, BTreeMap::new());
        registry.start_span("k", "second", SpanKind::Internal, BTreeMap::new());

        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn test_set_attribute_on_live_span() {
        let (registry, _batch) = registry_with_batch(otlp_only_config());

        registry.start_span("k", "op", SpanKind::Internal, BTreeMap::new());
        assert!(registry.set_attribute("k", "movie.id", "tt0111161"));
        assert!(!registry.set_attribute("missing", "a", "b"));
    }
}
