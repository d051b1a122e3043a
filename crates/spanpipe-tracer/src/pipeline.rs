//! Pipeline composition root
//!
//! Constructs and owns every pipeline component exactly once per process,
//! wiring them together explicitly: config handle → exporters → batch
//! processor → tracer → registry → error monitor. Embedding applications
//! build one `TelemetryPipeline` at startup, pass the handles down to
//! producers, and call [`shutdown`](TelemetryPipeline::shutdown) on exit
//! to drain every background task.

use std::sync::Arc;

use spanpipe_core::config::{ConfigHandle, ConfigUpdate, TelemetryConfig};
use spanpipe_export::{BatchProcessor, ConsoleExporter, OtlpHttpExporter, PipelineMetrics};

use crate::monitor::ErrorMonitor;
use crate::registry::SpanRegistry;
use crate::tracer::Tracer;

/// Owns the wired telemetry pipeline for one process.
pub struct TelemetryPipeline {
    config: ConfigHandle,
    metrics: Arc<PipelineMetrics>,
    batch: Arc<BatchProcessor>,
    tracer: Arc<Tracer>,
    registry: Arc<SpanRegistry>,
    monitor: Arc<ErrorMonitor>,
}

impl TelemetryPipeline {
    /// Wire a pipeline from the given configuration. Background tasks are
    /// not running until [`start`](TelemetryPipeline::start) is called.
    pub fn new(config: TelemetryConfig) -> anyhow::Result<Self> {
        let config = ConfigHandle::new(config);
        let metrics = Arc::new(PipelineMetrics::new()?);

        let console = Arc::new(ConsoleExporter::stdout());
        let otlp = Arc::new(OtlpHttpExporter::new(config.clone()));
        let batch = Arc::new(BatchProcessor::new(
            otlp,
            config.clone(),
            Arc::clone(&metrics),
        ));

        let tracer = Arc::new(Tracer::new(
            config.clone(),
            Some(console),
            Some(Arc::clone(&batch)),
            Arc::clone(&metrics),
        ));
        let registry = Arc::new(SpanRegistry::new(Arc::clone(&tracer)));
        let monitor = Arc::new(ErrorMonitor::new(Arc::clone(&tracer)));

        Ok(Self {
            config,
            metrics,
            batch,
            tracer,
            registry,
            monitor,
        })
    }

    /// Start the batch flush loop on the current tokio runtime.
    pub fn start(&self) {
        self.batch.start();
    }

    /// Install the panic monitor (chains the existing hook).
    pub fn install_panic_monitor(&self) {
        self.monitor.install_panic_monitor();
    }

    /// Merge a partial configuration update into the live config.
    pub fn update_config(&self, update: ConfigUpdate) {
        self.config.update(update);
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    pub fn tracer(&self) -> &Arc<Tracer> {
        &self.tracer
    }

    pub fn registry(&self) -> &Arc<SpanRegistry> {
        &self.registry
    }

    pub fn monitor(&self) -> &Arc<ErrorMonitor> {
        &self.monitor
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Drain and stop every background task: live registry entries are
    /// discarded, the batch queue is flushed, the flush task joined and
    /// the exporter shut down.
    pub async fn shutdown(&self) {
        self.registry.clear_active();
        self.batch.shutdown().await;
    }
}
