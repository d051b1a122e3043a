//! Error normalization and process-wide capture
//!
//! Converts caught errors into span-shaped records tagged with an
//! `error.source` (api/ui/logic/global/task) and an `error.handled` flag.
//! Handled errors were caught and logged deliberately; unhandled ones
//! escaped to the panic hook or out of a detached task and are action
//! items rather than informational records.
//!
//! The panic hook chains the previously installed hook and always delegates
//! to it — the pipeline observes, it never swallows. Everything else goes
//! through an explicit, ordered observer registry with unregister guards.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::warn;

use spanpipe_core::domain::errors::ErrorSource;
use spanpipe_core::domain::span::{AttributeValue, ExceptionInfo, SpanKind};

use crate::tracer::Tracer;

/// Normalized view of one captured error, handed to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub source: ErrorSource,
    pub handled: bool,
    pub error_type: String,
    pub message: String,
}

/// Receives every normalized error in registration order.
pub trait ErrorObserver: Send + Sync {
    fn on_error(&self, report: &ErrorReport);
}

/// Ordered list of error observers with explicit unregistration.
pub struct ObserverRegistry {
    observers: Mutex<Vec<(u64, Arc<dyn ErrorObserver>)>>,
    next_id: AtomicU64,
}

impl ObserverRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Register an observer. Hold the returned guard for as long as the
    /// observer should stay active; dropping it (or calling
    /// [`unregister`](ObserverGuard::unregister)) removes the observer.
    pub fn register(self: &Arc<Self>, observer: Arc<dyn ErrorObserver>) -> ObserverGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers
            .lock()
            .expect("observer list poisoned")
            .push((id, observer));
        ObserverGuard {
            registry: Arc::downgrade(self),
            id,
        }
    }

    /// Invoke every observer, in registration order.
    pub fn notify(&self, report: &ErrorReport) {
        let snapshot: Vec<Arc<dyn ErrorObserver>> = self
            .observers
            .lock()
            .expect("observer list poisoned")
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in snapshot {
            observer.on_error(report);
        }
    }

    /// Number of currently registered observers.
    pub fn count(&self) -> usize {
        self.observers.lock().expect("observer list poisoned").len()
    }

    fn unregister_id(&self, id: u64) {
        self.observers
            .lock()
            .expect("observer list poisoned")
            .retain(|(entry_id, _)| *entry_id != id);
    }
}

/// Removes its observer when dropped or explicitly unregistered.
#[must_use = "dropping the guard unregisters the observer"]
pub struct ObserverGuard {
    registry: Weak<ObserverRegistry>,
    id: u64,
}

impl ObserverGuard {
    /// Remove the observer now.
    pub fn unregister(self) {
        // Drop does the work.
    }
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister_id(self.id);
        }
    }
}

/// Normalizes errors into exception spans and fans them out to observers.
pub struct ErrorMonitor {
    tracer: Arc<Tracer>,
    observers: Arc<ObserverRegistry>,
}

impl ErrorMonitor {
    pub fn new(tracer: Arc<Tracer>) -> Self {
        Self {
            tracer,
            observers: ObserverRegistry::new(),
        }
    }

    /// The observer registry backing this monitor.
    pub fn observers(&self) -> &Arc<ObserverRegistry> {
        &self.observers
    }

    /// Register an error observer; see [`ObserverRegistry::register`].
    pub fn register_observer(&self, observer: Arc<dyn ErrorObserver>) -> ObserverGuard {
        self.observers.register(observer)
    }

    // ========================================================================
    // Category helpers (handled errors)
    // ========================================================================

    /// Record a deliberately caught API failure.
    pub fn log_api_error<E: std::fmt::Display + ?Sized>(
        &self,
        error: &E,
        endpoint: Option<&str>,
        mut attributes: BTreeMap<String, AttributeValue>,
    ) {
        if let Some(endpoint) = endpoint {
            attributes.insert("api.endpoint".to_string(), AttributeValue::from(endpoint));
        }
        self.capture(ErrorSource::Api, true, ExceptionInfo::from_error(error), attributes);
    }

    /// Record a deliberately caught UI failure.
    pub fn log_ui_error<E: std::fmt::Display + ?Sized>(
        &self,
        error: &E,
        component: Option<&str>,
        mut attributes: BTreeMap<String, AttributeValue>,
    ) {
        if let Some(component) = component {
            attributes.insert("ui.component".to_string(), AttributeValue::from(component));
        }
        self.capture(ErrorSource::Ui, true, ExceptionInfo::from_error(error), attributes);
    }

    /// Record a deliberately caught business-logic failure.
    pub fn log_logic_error<E: std::fmt::Display + ?Sized>(
        &self,
        error: &E,
        attributes: BTreeMap<String, AttributeValue>,
    ) {
        self.capture(
            ErrorSource::Logic,
            true,
            ExceptionInfo::from_error(error),
            attributes,
        );
    }

    // ========================================================================
    // Process-wide capture (unhandled errors)
    // ========================================================================

    /// Install a panic hook that records each panic as a fatal unhandled
    /// error, then delegates to the previously installed hook. The previous
    /// hook always runs; the pipeline only observes.
    pub fn install_panic_monitor(self: &Arc<Self>) {
        let monitor = Arc::clone(self);
        let previous = std::panic::take_hook();

        std::panic::set_hook(Box::new(move |panic_info| {
            let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };

            let location = panic_info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                .unwrap_or_default();
            let backtrace = std::backtrace::Backtrace::force_capture().to_string();

            let mut attributes = BTreeMap::new();
            attributes.insert(
                "error.is_fatal".to_string(),
                AttributeValue::Bool(true),
            );
            if !location.is_empty() {
                attributes.insert(
                    "code.location".to_string(),
                    AttributeValue::from(location.as_str()),
                );
            }

            let exception =
                ExceptionInfo::new("panic", message.clone()).with_backtrace(backtrace);
            monitor.capture(ErrorSource::Global, false, exception, attributes);

            previous(panic_info);
        }));
    }

    /// Spawn a detached task whose error, should it escape, is recorded as
    /// an unhandled `task` failure. The Rust rendition of an
    /// unhandled-rejection handler.
    pub fn spawn_monitored<F, E>(
        self: &Arc<Self>,
        task_name: &str,
        future: F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: std::future::Future<Output = Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let monitor = Arc::clone(self);
        let task_name = task_name.to_string();
        tokio::spawn(async move {
            if let Err(error) = future.await {
                let mut attributes = BTreeMap::new();
                attributes.insert(
                    "task.name".to_string(),
                    AttributeValue::from(task_name.as_str()),
                );
                monitor.capture(
                    ErrorSource::Task,
                    false,
                    ExceptionInfo::from_error(&error),
                    attributes,
                );
            }
        })
    }

    // ========================================================================
    // Shared capture path
    // ========================================================================

    /// Record a normalized error as a short-lived exception span and notify
    /// observers. Never fails toward the caller.
    fn capture(
        &self,
        source: ErrorSource,
        handled: bool,
        exception: ExceptionInfo,
        mut attributes: BTreeMap<String, AttributeValue>,
    ) {
        attributes.insert(
            "error.source".to_string(),
            AttributeValue::from(source.as_str()),
        );
        attributes.insert("error.handled".to_string(), AttributeValue::Bool(handled));

        let report = ErrorReport {
            source,
            handled,
            error_type: exception.error_type.clone(),
            message: exception.message.clone(),
        };

        let span = self
            .tracer
            .start_span_kind("exception", SpanKind::Internal, attributes);
        self.tracer
            .end_span_with_exception(span, exception, BTreeMap::new());

        self.observers.notify(&report);

        if !handled {
            warn!(
                source = source.as_str(),
                message = %report.message,
                "Unhandled error captured"
            );
        }
    }
}
