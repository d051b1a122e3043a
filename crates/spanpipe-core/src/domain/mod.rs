//! Domain entities for the telemetry pipeline

pub mod errors;
pub mod newtypes;
pub mod span;

pub use errors::{ErrorSource, TelemetryError};
pub use newtypes::{SpanId, TraceId};
pub use span::{AttributeValue, ExceptionInfo, Span, SpanEvent, SpanKind, SpanStatus};
