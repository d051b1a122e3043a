//! Span domain entities
//!
//! A [`Span`] is one named, timed interval with attributes, events, a status
//! and an optional parent. Spans are mutable while open and become immutable
//! records once ended; ending a span a second time is a no-op rather than an
//! error, since duplicate end calls occur in real control flow (e.g.
//! cleanup-after-error paths).

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::newtypes::{SpanId, TraceId};

/// What kind of operation a span covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// Internal operation with no more specific category
    Internal,
    /// Outbound API call
    Api,
    /// User-initiated interaction (tap, submit, scroll)
    UserAction,
    /// Screen or view becoming visible
    ScreenLoad,
}

impl std::fmt::Display for SpanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SpanKind::Internal => "internal",
            SpanKind::Api => "api",
            SpanKind::UserAction => "user_action",
            SpanKind::ScreenLoad => "screen_load",
        };
        f.write_str(s)
    }
}

/// Terminal (or not-yet-terminal) state of a span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    /// Span is still open
    Unset,
    /// Span completed successfully
    Ok,
    /// Span completed with an error
    Error,
}

impl SpanStatus {
    /// Numeric status code used by the export record shape (0/1/2).
    pub fn code(&self) -> u32 {
        match self {
            SpanStatus::Unset => 0,
            SpanStatus::Ok => 1,
            SpanStatus::Error => 2,
        }
    }
}

impl std::fmt::Display for SpanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SpanStatus::Unset => "unset",
            SpanStatus::Ok => "ok",
            SpanStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Scalar attribute value attachable to spans, events and analytics payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl AttributeValue {
    /// Borrow the inner string, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::String(s) => f.write_str(s),
            AttributeValue::Int(i) => write!(f, "{i}"),
            AttributeValue::Float(v) => write!(f, "{v}"),
            AttributeValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        AttributeValue::Int(i64::from(v))
    }
}

impl From<u16> for AttributeValue {
    fn from(v: u16) -> Self {
        AttributeValue::Int(i64::from(v))
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

/// A timestamped event recorded within a span's interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    pub name: String,
    pub time_unix_nanos: u64,
    pub attributes: BTreeMap<String, AttributeValue>,
}

/// Normalized exception details attached to an error span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    /// Short type name of the error (last path segment of the Rust type)
    pub error_type: String,
    /// Rendered error message
    pub message: String,
    /// Captured backtrace, when available
    pub backtrace: Option<String>,
}

impl ExceptionInfo {
    /// Create exception details from an explicit type name and message.
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            backtrace: None,
        }
    }

    /// Create exception details from any displayable error, deriving the
    /// type name from the concrete error type.
    pub fn from_error<E: std::fmt::Display + ?Sized>(error: &E) -> Self {
        let full = std::any::type_name::<E>();
        let short = full.rsplit("::").next().unwrap_or(full);
        Self::new(short, error.to_string())
    }

    /// Attach a captured backtrace.
    pub fn with_backtrace(mut self, backtrace: impl Into<String>) -> Self {
        self.backtrace = Some(backtrace.into());
        self
    }
}

/// One traced interval
///
/// Created open, mutated by its producer, closed exactly once via [`end`]
/// or [`end_with_error`], after which every mutator is a no-op. Unsampled
/// spans skip attribute and event population entirely so that a `rate=0`
/// configuration costs almost nothing.
///
/// [`end`]: Span::end
/// [`end_with_error`]: Span::end_with_error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    name: String,
    kind: SpanKind,
    trace_id: TraceId,
    span_id: SpanId,
    parent_span_id: Option<SpanId>,
    start_time_unix_nanos: u64,
    end_time_unix_nanos: Option<u64>,
    status: SpanStatus,
    status_message: Option<String>,
    attributes: BTreeMap<String, AttributeValue>,
    events: Vec<SpanEvent>,
    exception: Option<ExceptionInfo>,
    sampled: bool,
}

impl Span {
    /// Create a new root span with freshly minted identifiers.
    pub fn new(name: impl Into<String>, kind: SpanKind) -> Self {
        Self {
            name: name.into(),
            kind,
            trace_id: TraceId::new(),
            span_id: SpanId::new(),
            parent_span_id: None,
            start_time_unix_nanos: now_unix_nanos(),
            end_time_unix_nanos: None,
            status: SpanStatus::Unset,
            status_message: None,
            attributes: BTreeMap::new(),
            events: Vec::new(),
            exception: None,
            sampled: true,
        }
    }

    /// Create a child span inheriting the parent's trace identifier and
    /// sampling decision.
    pub fn child_of(name: impl Into<String>, kind: SpanKind, parent: &Span) -> Self {
        let mut span = Self::new(name, kind);
        span.trace_id = parent.trace_id;
        span.parent_span_id = Some(parent.span_id);
        span.sampled = parent.sampled;
        span
    }

    /// Override the sampling decision. Decided once at creation time; a
    /// span's fate never changes over its lifetime.
    pub fn with_sampled(mut self, sampled: bool) -> Self {
        self.sampled = sampled;
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SpanKind {
        self.kind
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.parent_span_id
    }

    pub fn start_time_unix_nanos(&self) -> u64 {
        self.start_time_unix_nanos
    }

    pub fn end_time_unix_nanos(&self) -> Option<u64> {
        self.end_time_unix_nanos
    }

    pub fn status(&self) -> SpanStatus {
        self.status
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    pub fn events(&self) -> &[SpanEvent] {
        &self.events
    }

    pub fn exception(&self) -> Option<&ExceptionInfo> {
        self.exception.as_ref()
    }

    pub fn is_sampled(&self) -> bool {
        self.sampled
    }

    pub fn is_finished(&self) -> bool {
        self.end_time_unix_nanos.is_some()
    }

    /// Elapsed time between start and end, once closed.
    pub fn duration(&self) -> Option<Duration> {
        self.end_time_unix_nanos
            .map(|end| Duration::from_nanos(end.saturating_sub(self.start_time_unix_nanos)))
    }

    // ========================================================================
    // Mutators (no-ops once the span is finished or unsampled)
    // ========================================================================

    /// Attach one attribute. Ignored after the span has ended and on
    /// unsampled spans.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        if self.is_finished() || !self.sampled {
            return;
        }
        self.attributes.insert(key.into(), value.into());
    }

    /// Attach a batch of attributes.
    pub fn set_attributes<I>(&mut self, attrs: I)
    where
        I: IntoIterator<Item = (String, AttributeValue)>,
    {
        if self.is_finished() || !self.sampled {
            return;
        }
        self.attributes.extend(attrs);
    }

    /// Record a named event at the current time.
    pub fn add_event(&mut self, name: impl Into<String>) {
        self.add_event_with_attributes(name, BTreeMap::new());
    }

    /// Record a named event carrying its own attributes.
    pub fn add_event_with_attributes(
        &mut self,
        name: impl Into<String>,
        attributes: BTreeMap<String, AttributeValue>,
    ) {
        if self.is_finished() || !self.sampled {
            return;
        }
        self.events.push(SpanEvent {
            name: name.into(),
            time_unix_nanos: now_unix_nanos(),
            attributes,
        });
    }

    /// Close the span with status `ok`. A second close is a no-op.
    pub fn end(&mut self) {
        if self.is_finished() {
            return;
        }
        self.end_time_unix_nanos = Some(now_unix_nanos());
        self.status = SpanStatus::Ok;
    }

    /// Close the span with status `error`, attaching exception details.
    /// A second close is a no-op.
    pub fn end_with_error(&mut self, exception: ExceptionInfo) {
        if self.is_finished() {
            return;
        }
        self.end_time_unix_nanos = Some(now_unix_nanos());
        self.status = SpanStatus::Error;
        self.status_message = Some(exception.message.clone());
        self.exception = Some(exception);
    }
}

/// Current wall-clock time as Unix nanoseconds.
pub fn now_unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
