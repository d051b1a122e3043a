//! Analytics adapter port
//!
//! Explicit capability set every analytics backend implements. The
//! aggregating service fans each call out to all registered adapters and
//! isolates their failures from one another and from the host.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::domain::errors::TelemetryError;
use crate::domain::span::AttributeValue;

/// A third-party (or built-in) analytics backend.
#[async_trait]
pub trait AnalyticsAdapter: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    /// One-time SDK setup.
    async fn initialize(&self) -> Result<(), TelemetryError>;

    /// Record a named event with properties (already redacted).
    async fn track_event(
        &self,
        name: &str,
        properties: &BTreeMap<String, AttributeValue>,
    ) -> Result<(), TelemetryError>;

    /// Record a screen view.
    async fn track_screen(&self, screen_name: &str) -> Result<(), TelemetryError>;

    /// Attach persistent properties to the current user.
    async fn set_user_properties(
        &self,
        properties: &BTreeMap<String, AttributeValue>,
    ) -> Result<(), TelemetryError>;

    /// Identify or anonymize (`None`) the current user.
    async fn set_user_id(&self, user_id: Option<&str>) -> Result<(), TelemetryError>;

    /// Clear all user state, e.g. on logout.
    async fn reset(&self) -> Result<(), TelemetryError>;

    /// Whether this backend is currently active.
    fn is_enabled(&self) -> bool;
}
