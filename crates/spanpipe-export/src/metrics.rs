//! Prometheus self-metrics for the pipeline
//!
//! The pipeline never raises alerts toward the user; its health is visible
//! only through these counters (and development console output). Drops are
//! always counted, never silent.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Central registry of the pipeline's own counters.
pub struct PipelineMetrics {
    registry: Registry,
    /// Counter: finished spans accepted into the batch queue
    pub spans_enqueued_total: IntCounter,
    /// Counter: spans delivered, by exporter
    pub spans_exported_total: IntCounterVec,
    /// Counter: spans dropped, by reason (queue_full, export_failed, export_timeout, unsampled)
    pub spans_dropped_total: IntCounterVec,
    /// Counter: failed flush attempts, by exporter
    pub export_failures_total: IntCounterVec,
    /// Counter: telemetry-internal errors swallowed at public entry points
    pub internal_errors_total: IntCounter,
}

impl PipelineMetrics {
    /// Creates a new `PipelineMetrics` with all counters registered.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("spanpipe".to_string()), None)?;

        let spans_enqueued_total = IntCounter::with_opts(Opts::new(
            "spans_enqueued_total",
            "Finished spans accepted into the batch queue",
        ))?;
        registry.register(Box::new(spans_enqueued_total.clone()))?;

        let spans_exported_total = IntCounterVec::new(
            Opts::new("spans_exported_total", "Spans delivered to a sink"),
            &["exporter"],
        )?;
        registry.register(Box::new(spans_exported_total.clone()))?;

        let spans_dropped_total = IntCounterVec::new(
            Opts::new("spans_dropped_total", "Spans dropped by the pipeline"),
            &["reason"],
        )?;
        registry.register(Box::new(spans_dropped_total.clone()))?;

        let export_failures_total = IntCounterVec::new(
            Opts::new("export_failures_total", "Failed flush attempts"),
            &["exporter"],
        )?;
        registry.register(Box::new(export_failures_total.clone()))?;

        let internal_errors_total = IntCounter::with_opts(Opts::new(
            "internal_errors_total",
            "Telemetry-internal errors swallowed at the API boundary",
        ))?;
        registry.register(Box::new(internal_errors_total.clone()))?;

        Ok(Self {
            registry,
            spans_enqueued_total,
            spans_exported_total,
            spans_dropped_total,
            export_failures_total,
            internal_errors_total,
        })
    }

    // ========================================================================
    // Recording helpers
    // ========================================================================

    /// Record spans delivered through the named exporter.
    pub fn record_exported(&self, exporter: &str, count: u64) {
        self.spans_exported_total
            .with_label_values(&[exporter])
            .inc_by(count);
    }

    /// Record dropped spans with the reason they were dropped.
    pub fn record_dropped(&self, reason: &str, count: u64) {
        self.spans_dropped_total
            .with_label_values(&[reason])
            .inc_by(count);
    }

    /// Record a failed flush attempt for the named exporter.
    pub fn record_export_failure(&self, exporter: &str) {
        self.export_failures_total
            .with_label_values(&[exporter])
            .inc();
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// Encode all counters in Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
