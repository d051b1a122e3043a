//! Telemetry error types and the error-source taxonomy
//!
//! `TelemetryError` covers failures internal to the pipeline. These are never
//! allowed to propagate into the host application; public entry points catch
//! them and degrade to a `tracing::warn!`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur inside the telemetry pipeline
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    /// Span name was empty or otherwise unusable
    #[error("Invalid span name: {0}")]
    InvalidSpanName(String),

    /// Identifier failed to parse
    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    /// No live span registered under the given correlation key
    #[error("No active span for key: {0}")]
    SpanNotFound(String),

    /// An exporter rejected or failed to deliver a batch
    #[error("Export failed: {0}")]
    ExportFailed(String),

    /// A flush attempt exceeded its deadline
    #[error("Export timed out after {0} ms")]
    ExportTimeout(u64),

    /// The bounded span queue is at capacity
    #[error("Span queue full (capacity {0})")]
    QueueFull(usize),

    /// Configuration rejected at validation time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Where an error entered the pipeline
///
/// `handled` errors (api/ui/logic) were caught and logged deliberately by
/// application code; `global` and `task` errors escaped to a process-wide
/// handler and are action items rather than informational records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    /// Failure of an upstream API call
    Api,
    /// Failure raised by a UI component
    Ui,
    /// Failure in business logic
    Logic,
    /// Escaped to the process-wide panic hook
    Global,
    /// Escaped from a detached async task
    Task,
}

impl ErrorSource {
    /// Stable string form used as the `error.source` attribute value.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSource::Api => "api",
            ErrorSource::Ui => "ui",
            ErrorSource::Logic => "logic",
            ErrorSource::Global => "global",
            ErrorSource::Task => "task",
        }
    }
}

impl std::fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
