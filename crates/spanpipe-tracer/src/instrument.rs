//! Instrumentation wrappers
//!
//! Higher-order helpers that trace an arbitrary async operation: start a
//! span, await the operation, close the span on every exit path, and hand
//! the caller's result back unchanged. The pipeline is observational — an
//! instrumented operation's error is recorded on the span and then
//! returned exactly as it was produced.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use spanpipe_core::domain::span::{AttributeValue, ExceptionInfo, Span, SpanKind};

use crate::tracer::Tracer;

/// Result types that expose an HTTP-like status code.
///
/// `with_tracing` uses this to set `http.status_code` and to mark non-2xx
/// responses as span errors without converting the caller's `Ok` into an
/// `Err`.
pub trait HttpStatus {
    fn status_code(&self) -> Option<u16>;
}

impl HttpStatus for reqwest::Response {
    fn status_code(&self) -> Option<u16> {
        Some(self.status().as_u16())
    }
}

/// Options for [`with_tracing`].
#[derive(Debug, Clone, Default)]
pub struct TraceRequest {
    pub span_name: String,
    pub endpoint: Option<String>,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl TraceRequest {
    pub fn new(span_name: impl Into<String>) -> Self {
        Self {
            span_name: span_name.into(),
            ..Self::default()
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Trace an async operation returning `Result`. The span closes on every
/// exit path; the operation's output is returned unchanged.
pub async fn trace_async<T, E, F>(
    tracer: &Tracer,
    name: &str,
    attributes: BTreeMap<String, AttributeValue>,
    operation: F,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let span = tracer.start_span(name, attributes);
    let result = operation.await;
    match &result {
        Ok(_) => tracer.end_span(span),
        Err(error) => tracer.end_span_with_error(span, error, BTreeMap::new()),
    }
    result
}

/// Trace an async operation with no error channel; the span always closes
/// with status `ok`.
pub async fn measure_async<T, F>(tracer: &Tracer, name: &str, operation: F) -> T
where
    F: Future<Output = T>,
{
    let span = tracer.start_span(name, BTreeMap::new());
    let output = operation.await;
    tracer.end_span(span);
    output
}

/// Trace an API-shaped operation, inspecting HTTP-like results.
///
/// On `Ok`, the response's status code (when present) is recorded as
/// `http.status_code`; a non-2xx code marks the span as an error while the
/// `Ok` is still returned untouched. On `Err`, the error is recorded and
/// returned unchanged. The span closes on every path.
pub async fn with_tracing<R, E, F>(
    tracer: &Tracer,
    operation: F,
    request: TraceRequest,
) -> Result<R, E>
where
    F: Future<Output = Result<R, E>>,
    R: HttpStatus,
    E: std::fmt::Display,
{
    let mut attributes = request.attributes;
    if let Some(endpoint) = &request.endpoint {
        attributes.insert(
            "api.endpoint".to_string(),
            AttributeValue::from(endpoint.as_str()),
        );
    }

    let mut span = tracer.start_span_kind(&request.span_name, SpanKind::Api, attributes);
    let result = operation.await;

    match &result {
        Ok(response) => match response.status_code() {
            Some(code) if !(200..300).contains(&code) => {
                span.set_attribute("http.status_code", code);
                tracer.end_span_with_exception(
                    span,
                    ExceptionInfo::new("HttpError", format!("HTTP {code}")),
                    BTreeMap::new(),
                );
            }
            Some(code) => {
                span.set_attribute("http.status_code", code);
                tracer.end_span(span);
            }
            None => tracer.end_span(span),
        },
        Err(error) => tracer.end_span_with_error(span, error, BTreeMap::new()),
    }

    result
}

/// Start a user-action span (tap, submit, scroll).
pub fn start_user_action(
    tracer: &Tracer,
    action: &str,
    component: &str,
    mut attributes: BTreeMap<String, AttributeValue>,
) -> Span {
    attributes.insert("action.type".to_string(), AttributeValue::from(action));
    attributes.insert("ui.component".to_string(), AttributeValue::from(component));
    tracer.start_span_kind(
        &format!("user_action.{action}"),
        SpanKind::UserAction,
        attributes,
    )
}

/// Start an API-call span for a request the caller drives manually.
pub fn start_api_call(
    tracer: &Tracer,
    endpoint: &str,
    method: &str,
    mut attributes: BTreeMap<String, AttributeValue>,
) -> Span {
    attributes.insert("http.method".to_string(), AttributeValue::from(method));
    attributes.insert("api.endpoint".to_string(), AttributeValue::from(endpoint));
    tracer.start_span_kind(&format!("{method} {endpoint}"), SpanKind::Api, attributes)
}

/// Guard for a screen-load measurement. Ends the span explicitly via
/// [`end`](ScreenLoadSpan::end) or implicitly on drop, so a forgotten guard
/// cannot leave a span open.
pub struct ScreenLoadSpan {
    tracer: Arc<Tracer>,
    span: Option<Span>,
}

impl ScreenLoadSpan {
    /// Attach an attribute to the still-open screen-load span.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        if let Some(span) = &mut self.span {
            span.set_attribute(key, value);
        }
    }

    /// Close the span with status `ok`.
    pub fn end(mut self) {
        if let Some(span) = self.span.take() {
            self.tracer.end_span(span);
        }
    }

    /// Close the span with status `error`.
    pub fn end_with_error<E: std::fmt::Display + ?Sized>(mut self, error: &E) {
        if let Some(span) = self.span.take() {
            self.tracer.end_span_with_error(span, error, BTreeMap::new());
        }
    }
}

impl Drop for ScreenLoadSpan {
    fn drop(&mut self) {
        if let Some(span) = self.span.take() {
            self.tracer.end_span(span);
        }
    }
}

/// Measure a screen becoming visible; call [`end`](ScreenLoadSpan::end)
/// once the screen is interactive.
pub fn measure_screen_load(tracer: &Arc<Tracer>, screen_name: &str) -> ScreenLoadSpan {
    let mut attributes = BTreeMap::new();
    attributes.insert(
        "screen.name".to_string(),
        AttributeValue::from(screen_name),
    );
    let span = tracer.start_span_kind(
        &format!("screen.{screen_name}"),
        SpanKind::ScreenLoad,
        attributes,
    );
    ScreenLoadSpan {
        tracer: Arc::clone(tracer),
        span: Some(span),
    }
}

/// A reusable HTTP client pre-configured with a base URL and base span
/// attributes; every request is traced as an API span. Build one per
/// upstream service.
pub struct TracedClient {
    tracer: Arc<Tracer>,
    client: reqwest::Client,
    base_url: String,
    base_attributes: BTreeMap<String, AttributeValue>,
}

impl TracedClient {
    pub fn new(
        tracer: Arc<Tracer>,
        base_url: impl Into<String>,
        base_attributes: BTreeMap<String, AttributeValue>,
    ) -> Self {
        Self {
            tracer,
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            base_attributes,
        }
    }

    /// Traced GET request against `{base_url}{path}`.
    pub async fn get(&self, path: &str) -> Result<reqwest::Response, reqwest::Error> {
        self.execute(reqwest::Method::GET, path).await
    }

    /// Traced POST request against `{base_url}{path}`.
    pub async fn post(&self, path: &str) -> Result<reqwest::Response, reqwest::Error> {
        self.execute(reqwest::Method::POST, path).await
    }

    async fn execute(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let mut request = TraceRequest::new(format!("{method} {path}")).endpoint(path);
        request.attributes = self.base_attributes.clone();
        request = request.attribute("http.method", method.as_str());

        let future = self.client.request(method, &url).send();
        with_tracing(&self.tracer, future, request).await
    }
}
