//! Spanpipe Export - Sinks and batching
//!
//! Provides:
//! - `ConsoleExporter`: synchronous per-span development sink
//! - `OtlpHttpExporter`: batched JSON export to a trace collector
//! - `BatchProcessor`: bounded buffering with size/interval flush triggers
//! - `PipelineMetrics`: Prometheus counters for the pipeline's own health

pub mod batch;
pub mod console;
pub mod metrics;
pub mod otlp;

pub use batch::BatchProcessor;
pub use console::ConsoleExporter;
pub use metrics::PipelineMetrics;
pub use otlp::OtlpHttpExporter;
