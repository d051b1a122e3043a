//! Correlation identifier newtypes
//!
//! `TraceId` (128-bit) and `SpanId` (64-bit) render as lowercase hex and
//! validate on parse. Random minting never produces the all-zero value,
//! which is reserved as the invalid/nil identifier.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use super::errors::TelemetryError;

/// 128-bit trace identifier shared by every span of one causal tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(u128);

impl TraceId {
    /// Mint a new random, non-nil TraceId
    #[must_use]
    pub fn new() -> Self {
        loop {
            let candidate = Uuid::new_v4().as_u128();
            if candidate != 0 {
                return Self(candidate);
            }
        }
    }

    /// Wrap a raw 128-bit value
    #[must_use]
    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    /// The raw 128-bit value
    #[must_use]
    pub const fn as_u128(&self) -> u128 {
        self.0
    }

    /// The all-zero (invalid) TraceId
    #[must_use]
    pub const fn nil() -> Self {
        Self(0)
    }

    /// Whether this is the all-zero identifier
    #[must_use]
    pub const fn is_nil(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TraceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for TraceId {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 {
            return Err(TelemetryError::InvalidId(format!(
                "expected 32 hex chars, got {}",
                s.len()
            )));
        }
        u128::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| TelemetryError::InvalidId(format!("invalid trace id: {e}")))
    }
}

impl Serialize for TraceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TraceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// 64-bit span identifier, unique within a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(u64);

impl SpanId {
    /// Mint a new random, non-nil SpanId
    #[must_use]
    pub fn new() -> Self {
        loop {
            let candidate: u64 = rand::random();
            if candidate != 0 {
                return Self(candidate);
            }
        }
    }

    /// Wrap a raw 64-bit value
    #[must_use]
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// The raw 64-bit value
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// The all-zero (invalid) SpanId
    #[must_use]
    pub const fn nil() -> Self {
        Self(0)
    }

    /// Whether this is the all-zero identifier
    #[must_use]
    pub const fn is_nil(&self) -> bool {
        self.0 == 0
    }
}

impl Default for SpanId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SpanId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for SpanId {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 16 {
            return Err(TelemetryError::InvalidId(format!(
                "expected 16 hex chars, got {}",
                s.len()
            )));
        }
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| TelemetryError::InvalidId(format!("invalid span id: {e}")))
    }
}

impl Serialize for SpanId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SpanId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
