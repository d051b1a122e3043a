//! Console span sink
//!
//! Writes each finished span to a `Write` target (stdout by default) as one
//! human-readable line, synchronously, with no batching. Used in development
//! builds only; production disables it to keep telemetry detail out of
//! device logs and to avoid the write cost in release builds.

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;

use spanpipe_core::domain::errors::TelemetryError;
use spanpipe_core::domain::span::{Span, SpanStatus};
use spanpipe_core::ports::SpanExporter;

/// Development sink writing one formatted line per finished span.
pub struct ConsoleExporter {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleExporter {
    /// Console exporter writing to the process stdout.
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Console exporter writing to an arbitrary target (used by tests).
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Synchronously write one span. This is the path the tracer calls on
    /// span end; the [`SpanExporter`] impl below exists so the console sink
    /// can also stand in wherever a batch exporter is expected.
    pub fn write_span(&self, span: &Span) -> Result<(), TelemetryError> {
        let line = format_span(span);
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| TelemetryError::ExportFailed("console writer poisoned".into()))?;
        writeln!(writer, "{line}")
            .and_then(|()| writer.flush())
            .map_err(|e| TelemetryError::ExportFailed(format!("console write: {e}")))
    }
}

/// Render a finished span as a single diagnostic line.
pub fn format_span(span: &Span) -> String {
    let duration_ms = span
        .duration()
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();

    let mut line = format!(
        "[span] {} kind={} status={} duration_ms={} trace_id={} span_id={}",
        span.name(),
        span.kind(),
        span.status(),
        duration_ms,
        span.trace_id(),
        span.span_id(),
    );

    if let Some(parent) = span.parent_span_id() {
        line.push_str(&format!(" parent_span_id={parent}"));
    }
    if span.status() == SpanStatus::Error {
        if let Some(message) = span.status_message() {
            line.push_str(&format!(" error={message:?}"));
        }
    }
    for (key, value) in span.attributes() {
        line.push_str(&format!(" {key}={value}"));
    }
    if !span.events().is_empty() {
        line.push_str(&format!(" events={}", span.events().len()));
    }

    line
}

#[async_trait]
impl SpanExporter for ConsoleExporter {
    fn name(&self) -> &str {
        "console"
    }

    async fn export(&self, batch: &[Span]) -> Result<(), TelemetryError> {
        for span in batch {
            self.write_span(span)?;
        }
        Ok(())
    }
}
