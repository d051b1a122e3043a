//! SecurityAuditLogger - bounded, interval-flushed audit queue
//!
//! Producers (auth flows, biometric prompts, secure storage) call the
//! `log_*` convenience methods; events accumulate in a bounded queue that a
//! background task flushes to an [`AuditSink`] on a fixed interval. All
//! methods are non-fatal: persistence failures are logged via
//! `tracing::warn!` and counted, never propagated to the producer. Nothing
//! is ever dropped silently.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use spanpipe_core::config::ConfigHandle;

use crate::event::{SecurityEvent, SecurityEventType};

/// Destination for flushed audit events (database, file, remote service).
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn persist(&self, events: &[SecurityEvent]) -> anyhow::Result<()>;
}

/// Development sink writing audit events to the structured log.
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn persist(&self, events: &[SecurityEvent]) -> anyhow::Result<()> {
        for event in events {
            info!(
                event_type = %event.event_type(),
                user_id = ?event.user_id(),
                success = event.success(),
                "audit event"
            );
        }
        Ok(())
    }
}

/// Queues audit events and flushes them on a fixed interval.
pub struct SecurityAuditLogger {
    sink: Arc<dyn AuditSink>,
    config: ConfigHandle,
    queue: Mutex<VecDeque<SecurityEvent>>,
    dropped: AtomicU64,
    shutdown_token: CancellationToken,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl SecurityAuditLogger {
    /// Create a logger feeding the given sink. The flush loop is not
    /// running until [`start`](SecurityAuditLogger::start) is called.
    pub fn new(sink: Arc<dyn AuditSink>, config: ConfigHandle) -> Self {
        Self {
            sink,
            config,
            queue: Mutex::new(VecDeque::new()),
            dropped: AtomicU64::new(0),
            shutdown_token: CancellationToken::new(),
            flush_task: Mutex::new(None),
        }
    }

    /// Spawn the interval flush loop on the current tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.flush_task.lock().expect("flush task lock poisoned");
        if slot.is_some() {
            return;
        }
        let this = Arc::clone(self);
        *slot = Some(tokio::spawn(async move { this.run().await }));
    }

    /// Queue one event. Never blocks and never fails toward the producer;
    /// on overflow the event is dropped with a warning and a count.
    pub fn record(&self, event: SecurityEvent) {
        let max = self.config.read(|c| c.audit.max_queue_size);
        let mut queue = self.queue.lock().expect("audit queue poisoned");
        if queue.len() >= max {
            drop(queue);
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                capacity = max,
                dropped_total = total,
                event_type = %event.event_type(),
                "Audit queue full, dropping event"
            );
            return;
        }
        queue.push_back(event);
    }

    // ========================================================================
    // Auth lifecycle
    // ========================================================================

    /// Log a credential submission.
    pub fn log_login_attempt(&self, user_id: Option<&str>) {
        let mut event = SecurityEvent::new(SecurityEventType::LoginAttempt, true);
        if let Some(user_id) = user_id {
            event = event.with_user_id(user_id);
        }
        self.record(event);
    }

    /// Log a successful authentication.
    pub fn log_login_success(&self, user_id: &str, method: &str) {
        self.record(
            SecurityEvent::new(SecurityEventType::LoginSuccess, true)
                .with_user_id(user_id)
                .with_metadata(json!({ "method": method })),
        );
    }

    /// Log a failed authentication.
    pub fn log_login_failure(&self, user_id: Option<&str>, reason: &str) {
        let mut event = SecurityEvent::new(SecurityEventType::LoginFailure, false)
            .with_metadata(json!({ "reason": reason }));
        if let Some(user_id) = user_id {
            event = event.with_user_id(user_id);
        }
        self.record(event);
    }

    /// Log a logout.
    pub fn log_logout(&self, user_id: &str) {
        self.record(SecurityEvent::new(SecurityEventType::Logout, true).with_user_id(user_id));
    }

    // ========================================================================
    // Device security
    // ========================================================================

    /// Log the outcome of a biometric prompt.
    pub fn log_biometric_auth(&self, user_id: Option<&str>, success: bool) {
        let mut event = SecurityEvent::new(SecurityEventType::BiometricAuth, success);
        if let Some(user_id) = user_id {
            event = event.with_user_id(user_id);
        }
        self.record(event);
    }

    /// Log a token refresh outcome.
    pub fn log_token_refresh(&self, user_id: &str, success: bool) {
        self.record(
            SecurityEvent::new(SecurityEventType::TokenRefresh, success).with_user_id(user_id),
        );
    }

    /// Log a secure storage access.
    pub fn log_secure_storage_access(&self, operation: &str, entry: &str, success: bool) {
        let event_type = if operation == "write" {
            SecurityEventType::SecureStorageWrite
        } else {
            SecurityEventType::SecureStorageRead
        };
        self.record(
            SecurityEvent::new(event_type, success).with_metadata(json!({ "entry": entry })),
        );
    }

    /// Log a runtime permission change.
    pub fn log_permission_change(&self, user_id: &str, permission: &str, granted: bool) {
        self.record(
            SecurityEvent::new(SecurityEventType::PermissionChange, true)
                .with_user_id(user_id)
                .with_metadata(json!({ "permission": permission, "granted": granted })),
        );
    }

    // ========================================================================
    // Flushing
    // ========================================================================

    /// Interval flush loop; drains once more on shutdown.
    async fn run(&self) {
        let interval_secs = self.config.read(|c| c.audit.flush_interval_secs);
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => self.flush_once().await,
                _ = self.shutdown_token.cancelled() => break,
            }
        }

        self.flush_once().await;
        debug!("Audit flush loop stopped");
    }

    /// Drain the queue and persist everything in one sink call. Persistence
    /// failures drop the drained events, counted and warned.
    pub async fn flush_once(&self) {
        let events: Vec<SecurityEvent> = {
            let mut queue = self.queue.lock().expect("audit queue poisoned");
            queue.drain(..).collect()
        };
        if events.is_empty() {
            return;
        }

        if let Err(e) = self.sink.persist(&events).await {
            let total = self
                .dropped
                .fetch_add(events.len() as u64, Ordering::Relaxed)
                + events.len() as u64;
            warn!(
                error = %e,
                lost = events.len(),
                dropped_total = total,
                "Failed to persist audit events"
            );
        }
    }

    /// Stop the flush loop and drain remaining events.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();
        let handle = self
            .flush_task
            .lock()
            .expect("flush task lock poisoned")
            .take();
        match handle {
            Some(handle) => {
                if handle.await.is_err() {
                    warn!("Audit flush task panicked during shutdown");
                }
            }
            None => self.flush_once().await,
        }
    }

    /// Events currently queued.
    pub fn queue_len(&self) -> usize {
        self.queue.lock().expect("audit queue poisoned").len()
    }

    /// Events dropped so far (overflow plus persistence failures).
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
