//! Spanpipe Core - Domain model and configuration
//!
//! Provides:
//! - `domain`: span entities, identifiers, attribute values, error taxonomy
//! - `config`: typed configuration with validation and a runtime-mutable handle
//! - `redact`: deny-list attribute redaction applied before anything leaves the process
//! - `sampler`: probabilistic head sampling
//! - `ports`: exporter and analytics adapter traits implemented by sink crates

pub mod config;
pub mod domain;
pub mod ports;
pub mod redact;
pub mod sampler;

pub use config::{ConfigBuilder, ConfigHandle, ConfigUpdate, Environment, TelemetryConfig};
pub use domain::errors::{ErrorSource, TelemetryError};
pub use domain::newtypes::{SpanId, TraceId};
pub use domain::span::{AttributeValue, ExceptionInfo, Span, SpanEvent, SpanKind, SpanStatus};
pub use ports::{AnalyticsAdapter, SpanExporter};
pub use redact::{filter_sensitive_attributes, REDACTED};
pub use sampler::should_sample;
