//! Span exporter port
//!
//! Every sink that receives finished spans implements this trait: the
//! console sink, the network batch sink, and any test double. Exporters
//! must tolerate being handed an empty batch.

use async_trait::async_trait;

use crate::domain::errors::TelemetryError;
use crate::domain::span::Span;

/// A destination for finished spans.
#[async_trait]
pub trait SpanExporter: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    /// One-time setup before the first batch.
    async fn initialize(&self) -> Result<(), TelemetryError> {
        Ok(())
    }

    /// Deliver a batch of finished spans. Failures are reported to the
    /// caller (the batch processor), never to the host application.
    async fn export(&self, batch: &[Span]) -> Result<(), TelemetryError>;

    /// Release resources; called once during pipeline shutdown.
    async fn shutdown(&self) -> Result<(), TelemetryError> {
        Ok(())
    }
}
