//! Spanpipe Tracer - Producer-facing telemetry API
//!
//! Provides:
//! - `Tracer`: span lifecycle management and dispatch to the exporters
//! - `SpanRegistry`: keyed live spans for cross-callback correlation
//! - `ErrorMonitor`: error normalization, panic hook, observer registry
//! - `instrument`: wrappers that trace async operations and HTTP calls
//! - `AnalyticsService`: fan-out to registered analytics adapters
//! - `TelemetryPipeline`: the composition root wiring everything together
//!
//! The one rule every entry point here obeys: telemetry must never break
//! the host application. Internal failures are swallowed, counted and
//! logged via `tracing::warn!`; instrumented-operation errors are recorded
//! and returned to the caller unchanged.

pub mod analytics;
pub mod instrument;
pub mod monitor;
pub mod pipeline;
pub mod registry;
pub mod tracer;

pub use analytics::{AnalyticsService, LogAnalyticsAdapter};
pub use instrument::{HttpStatus, ScreenLoadSpan, TraceRequest, TracedClient};
pub use monitor::{ErrorMonitor, ErrorObserver, ErrorReport, ObserverGuard, ObserverRegistry};
pub use pipeline::TelemetryPipeline;
pub use registry::SpanRegistry;
pub use tracer::Tracer;
