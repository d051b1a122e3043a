//! OTLP-style HTTP span exporter
//!
//! Serializes a batch of finished spans into the collector record shape and
//! POSTs it to `{export_endpoint}/v1/traces` as JSON. The endpoint and
//! service identity are read from the live config on every flush, so a
//! runtime `update` takes effect on the next batch.
//!
//! Per-attempt deadlines are enforced by the batch processor, not here.

use async_trait::async_trait;
use serde_json::{json, Value};

use spanpipe_core::config::ConfigHandle;
use spanpipe_core::domain::errors::TelemetryError;
use spanpipe_core::domain::span::Span;
use spanpipe_core::ports::SpanExporter;

/// Batched JSON exporter targeting a trace collector.
pub struct OtlpHttpExporter {
    client: reqwest::Client,
    config: ConfigHandle,
}

impl OtlpHttpExporter {
    /// Create an exporter reading endpoint and service identity from the
    /// given config handle.
    pub fn new(config: ConfigHandle) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Build the JSON payload for one batch.
    fn build_payload(&self, batch: &[Span]) -> Value {
        let (service_name, service_version) = self
            .config
            .read(|c| (c.service_name.clone(), c.service_version.clone()));

        json!({
            "resourceSpans": [{
                "resource": {
                    "attributes": {
                        "service.name": service_name,
                        "service.version": service_version,
                    }
                },
                "scopeSpans": [{
                    "scope": { "name": "spanpipe" },
                    "spans": batch.iter().map(span_record).collect::<Vec<_>>(),
                }]
            }]
        })
    }
}

/// Serialize one finished span into the collector record shape.
fn span_record(span: &Span) -> Value {
    let mut record = json!({
        "traceId": span.trace_id().to_string(),
        "spanId": span.span_id().to_string(),
        "name": span.name(),
        "kind": span.kind().to_string(),
        "startTimeUnixNano": span.start_time_unix_nanos(),
        "endTimeUnixNano": span.end_time_unix_nanos(),
        "attributes": span.attributes(),
        "events": span.events().iter().map(|event| {
            json!({
                "name": event.name,
                "timeUnixNano": event.time_unix_nanos,
                "attributes": event.attributes,
            })
        }).collect::<Vec<_>>(),
        "status": {
            "code": span.status().code(),
            "message": span.status_message(),
        },
    });

    if let Some(parent) = span.parent_span_id() {
        record["parentSpanId"] = Value::String(parent.to_string());
    }
    if let Some(exception) = span.exception() {
        record["exception"] = json!({
            "type": exception.error_type,
            "message": exception.message,
            "stacktrace": exception.backtrace,
        });
    }

    record
}

#[async_trait]
impl SpanExporter for OtlpHttpExporter {
    fn name(&self) -> &str {
        "otlp"
    }

    async fn export(&self, batch: &[Span]) -> Result<(), TelemetryError> {
        if batch.is_empty() {
            return Ok(());
        }

        let endpoint = self.config.read(|c| c.export_endpoint.clone());
        let url = format!("{}/v1/traces", endpoint.trim_end_matches('/'));
        let payload = self.build_payload(batch);

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| TelemetryError::ExportFailed(format!("POST {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(TelemetryError::ExportFailed(format!(
                "collector returned {}",
                response.status()
            )));
        }

        tracing::debug!(spans = batch.len(), %url, "Exported span batch");
        Ok(())
    }
}
