//! Attribute redaction
//!
//! Replaces values of sensitive-looking keys with a fixed marker before any
//! attribute set leaves the process (span export, audit persistence,
//! analytics fan-out). Matching is a case-insensitive substring check
//! against a fixed deny-list; the transform is pure and idempotent.
//!
//! Redaction runs on every span unconditionally. There is no sampling
//! exemption: security trumps performance.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::domain::span::AttributeValue;

/// Marker substituted for every redacted value.
pub const REDACTED: &str = "***REDACTED***";

/// Deny-list of key substrings, matched case-insensitively after `-` and
/// `_` are normalized to spaces (so `api_key`, `api-key` and `api key`
/// all match).
const SENSITIVE_KEY_PATTERNS: &[&str] = &[
    "password",
    "token",
    "secret",
    "api key",
    "authorization",
    "cookie",
    "key",
    "auth",
    "credential",
    "session",
    "pin",
    "ssn",
    "credit card",
];

/// Whether a key matches the sensitive deny-list.
pub fn is_sensitive_key(key: &str) -> bool {
    let normalized: String = key
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c == '_' { ' ' } else { c })
        .collect();
    SENSITIVE_KEY_PATTERNS
        .iter()
        .any(|pattern| normalized.contains(pattern))
}

/// Return a copy of `attrs` with every sensitive value replaced by
/// [`REDACTED`]. Non-sensitive entries pass through unchanged.
pub fn filter_sensitive_attributes(
    attrs: &BTreeMap<String, AttributeValue>,
) -> BTreeMap<String, AttributeValue> {
    attrs
        .iter()
        .map(|(key, value)| {
            let value = if is_sensitive_key(key) {
                AttributeValue::String(REDACTED.to_string())
            } else {
                value.clone()
            };
            (key.clone(), value)
        })
        .collect()
}

/// In-place variant used on attribute sets the pipeline already owns.
pub fn redact_in_place(attrs: &mut BTreeMap<String, AttributeValue>) {
    for (key, value) in attrs.iter_mut() {
        if is_sensitive_key(key) {
            *value = AttributeValue::String(REDACTED.to_string());
        }
    }
}

/// Redact sensitive keys within a JSON object, recursing into nested
/// objects and arrays. Used for audit-event metadata, which is free-form
/// JSON rather than a flat attribute map.
pub fn filter_sensitive_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let redacted = map
                .iter()
                .map(|(key, inner)| {
                    let inner = if is_sensitive_key(key) {
                        Value::String(REDACTED.to_string())
                    } else {
                        filter_sensitive_json(inner)
                    };
                    (key.clone(), inner)
                })
                .collect();
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(filter_sensitive_json).collect()),
        other => other.clone(),
    }
}
