//! Security audit event entities
//!
//! Audit events record authentication and security-relevant actions for
//! later review. Metadata is redacted at construction time, before the
//! event is ever queued, so sensitive values cannot reach a sink even if
//! a producer passes them in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use spanpipe_core::redact::filter_sensitive_json;

/// Security-relevant actions recorded in the audit stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    /// Credentials submitted
    LoginAttempt,
    /// Authentication succeeded
    LoginSuccess,
    /// Authentication failed
    LoginFailure,
    /// User logged out
    Logout,
    /// Biometric prompt shown and answered
    BiometricAuth,
    /// OAuth/session token refreshed
    TokenRefresh,
    /// Secure storage read
    SecureStorageRead,
    /// Secure storage write
    SecureStorageWrite,
    /// Authenticated session started
    SessionStart,
    /// Authenticated session ended
    SessionEnd,
    /// A runtime permission was granted or revoked
    PermissionChange,
}

impl std::fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SecurityEventType::LoginAttempt => "login_attempt",
            SecurityEventType::LoginSuccess => "login_success",
            SecurityEventType::LoginFailure => "login_failure",
            SecurityEventType::Logout => "logout",
            SecurityEventType::BiometricAuth => "biometric_auth",
            SecurityEventType::TokenRefresh => "token_refresh",
            SecurityEventType::SecureStorageRead => "secure_storage_read",
            SecurityEventType::SecureStorageWrite => "secure_storage_write",
            SecurityEventType::SessionStart => "session_start",
            SecurityEventType::SessionEnd => "session_end",
            SecurityEventType::PermissionChange => "permission_change",
        };
        f.write_str(s)
    }
}

/// One audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    id: String,
    event_type: SecurityEventType,
    timestamp: DateTime<Utc>,
    user_id: Option<String>,
    success: bool,
    metadata: Value,
}

impl SecurityEvent {
    /// Create a new audit event with the required fields.
    pub fn new(event_type: SecurityEventType, success: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type,
            timestamp: Utc::now(),
            user_id: None,
            success,
            metadata: Value::Null,
        }
    }

    /// Associate the event with a user.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attach structured metadata. Sensitive keys are redacted here, at
    /// construction time.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = filter_sensitive_json(&metadata);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn event_type(&self) -> SecurityEventType {
        self.event_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn metadata(&self) -> &Value {
        &self.metadata
    }
}
