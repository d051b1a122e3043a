//! Analytics fan-out service
//!
//! Aggregates any number of [`AnalyticsAdapter`] backends behind one call
//! surface. Event properties pass through redaction once before fan-out;
//! each adapter's failure is isolated (warned and counted, never
//! propagated, never blocking the other adapters).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use spanpipe_core::domain::errors::TelemetryError;
use spanpipe_core::domain::span::AttributeValue;
use spanpipe_core::ports::AnalyticsAdapter;
use spanpipe_core::redact::filter_sensitive_attributes;

/// Fans analytics calls out to every registered, enabled adapter.
pub struct AnalyticsService {
    adapters: Vec<Arc<dyn AnalyticsAdapter>>,
}

impl AnalyticsService {
    /// Create a service over an explicit adapter collection, constructed
    /// and owned by the application's composition root.
    pub fn new(adapters: Vec<Arc<dyn AnalyticsAdapter>>) -> Self {
        Self { adapters }
    }

    /// Number of registered adapters.
    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }

    /// Initialize every adapter; failures are warned and skipped.
    pub async fn initialize(&self) {
        for adapter in &self.adapters {
            if let Err(e) = adapter.initialize().await {
                warn!(adapter = adapter.name(), error = %e, "Analytics adapter init failed");
            }
        }
    }

    /// Record a named event on every enabled adapter. Properties are
    /// redacted once before fan-out.
    pub async fn track_event(&self, name: &str, properties: &BTreeMap<String, AttributeValue>) {
        let properties = filter_sensitive_attributes(properties);
        for adapter in self.enabled() {
            if let Err(e) = adapter.track_event(name, &properties).await {
                warn!(adapter = adapter.name(), event = name, error = %e, "track_event failed");
            }
        }
    }

    /// Record a screen view on every enabled adapter.
    pub async fn track_screen(&self, screen_name: &str) {
        for adapter in self.enabled() {
            if let Err(e) = adapter.track_screen(screen_name).await {
                warn!(adapter = adapter.name(), screen = screen_name, error = %e, "track_screen failed");
            }
        }
    }

    /// Attach persistent user properties on every enabled adapter.
    pub async fn set_user_properties(&self, properties: &BTreeMap<String, AttributeValue>) {
        let properties = filter_sensitive_attributes(properties);
        for adapter in self.enabled() {
            if let Err(e) = adapter.set_user_properties(&properties).await {
                warn!(adapter = adapter.name(), error = %e, "set_user_properties failed");
            }
        }
    }

    /// Identify (or anonymize, with `None`) the user on every enabled
    /// adapter.
    pub async fn set_user_id(&self, user_id: Option<&str>) {
        for adapter in self.enabled() {
            if let Err(e) = adapter.set_user_id(user_id).await {
                warn!(adapter = adapter.name(), error = %e, "set_user_id failed");
            }
        }
    }

    /// Clear user state on every enabled adapter (logout).
    pub async fn reset(&self) {
        for adapter in self.enabled() {
            if let Err(e) = adapter.reset().await {
                warn!(adapter = adapter.name(), error = %e, "reset failed");
            }
        }
    }

    fn enabled(&self) -> impl Iterator<Item = &Arc<dyn AnalyticsAdapter>> {
        self.adapters.iter().filter(|a| a.is_enabled())
    }
}

/// Built-in development backend that writes analytics calls to the
/// structured log.
pub struct LogAnalyticsAdapter;

#[async_trait]
impl AnalyticsAdapter for LogAnalyticsAdapter {
    fn name(&self) -> &str {
        "log"
    }

    async fn initialize(&self) -> Result<(), TelemetryError> {
        Ok(())
    }

    async fn track_event(
        &self,
        name: &str,
        properties: &BTreeMap<String, AttributeValue>,
    ) -> Result<(), TelemetryError> {
        info!(event = name, properties = ?properties, "analytics event");
        Ok(())
    }

    async fn track_screen(&self, screen_name: &str) -> Result<(), TelemetryError> {
        info!(screen = screen_name, "analytics screen view");
        Ok(())
    }

    async fn set_user_properties(
        &self,
        properties: &BTreeMap<String, AttributeValue>,
    ) -> Result<(), TelemetryError> {
        info!(properties = ?properties, "analytics user properties");
        Ok(())
    }

    async fn set_user_id(&self, user_id: Option<&str>) -> Result<(), TelemetryError> {
        info!(user_id = ?user_id, "analytics identify");
        Ok(())
    }

    async fn reset(&self) -> Result<(), TelemetryError> {
        info!("analytics reset");
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        true
    }
}
