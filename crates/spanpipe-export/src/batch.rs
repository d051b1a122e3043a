//! Bounded span batching
//!
//! [`BatchProcessor`] buffers finished spans and flushes them to one
//! exporter when either the batch-size threshold is reached or the
//! scheduled delay elapses, whichever comes first. The queue is hard-capped:
//! on overflow the newly finished span is dropped and counted — producers
//! are never blocked and never see an error. A failed flush attempt drops
//! the batch (default) or retries with bounded backoff, per the configured
//! [`RetryPolicy`].
//!
//! The flush loop is a spawned task controlled by a `CancellationToken`;
//! [`shutdown`](BatchProcessor::shutdown) cancels it, drains the queue and
//! joins the task.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use spanpipe_core::config::{ConfigHandle, RetryPolicy};
use spanpipe_core::domain::span::Span;
use spanpipe_core::ports::SpanExporter;

use crate::metrics::PipelineMetrics;

/// Buffers finished spans and flushes them to an exporter.
pub struct BatchProcessor {
    queue: Mutex<VecDeque<Span>>,
    exporter: Arc<dyn SpanExporter>,
    config: ConfigHandle,
    metrics: Arc<PipelineMetrics>,
    dropped_overflow: AtomicU64,
    flush_signal: Notify,
    shutdown_token: CancellationToken,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl BatchProcessor {
    /// Create a processor feeding the given exporter. The flush loop is not
    /// running until [`start`](BatchProcessor::start) is called.
    pub fn new(
        exporter: Arc<dyn SpanExporter>,
        config: ConfigHandle,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            exporter,
            config,
            metrics,
            dropped_overflow: AtomicU64::new(0),
            flush_signal: Notify::new(),
            shutdown_token: CancellationToken::new(),
            flush_task: Mutex::new(None),
        }
    }

    /// Spawn the flush loop on the current tokio runtime. Calling `start`
    /// more than once is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.flush_task.lock().expect("flush task lock poisoned");
        if slot.is_some() {
            return;
        }

        let this = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            if let Err(e) = this.exporter.initialize().await {
                warn!(exporter = this.exporter.name(), error = %e, "Exporter initialization failed");
            }
            this.run().await;
        }));
    }

    /// Accept one finished span. Never blocks and never fails toward the
    /// caller; on overflow the span is dropped and counted.
    pub fn enqueue(&self, span: Span) {
        let (max_queue, batch_size) = self
            .config
            .read(|c| (c.batch.max_queue_size, c.batch.max_export_batch_size));

        let len = {
            let mut queue = self.queue.lock().expect("span queue poisoned");
            if queue.len() >= max_queue {
                drop(queue);
                self.dropped_overflow.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_dropped("queue_full", 1);
                debug!(capacity = max_queue, "Span queue full, dropping span");
                return;
            }
            queue.push_back(span);
            queue.len()
        };

        self.metrics.spans_enqueued_total.inc();
        if len >= batch_size {
            self.flush_signal.notify_one();
        }
    }

    /// Number of spans currently buffered.
    pub fn queue_len(&self) -> usize {
        self.queue.lock().expect("span queue poisoned").len()
    }

    /// Total spans dropped because the queue was full.
    pub fn dropped_overflow_count(&self) -> u64 {
        self.dropped_overflow.load(Ordering::Relaxed)
    }

    /// Flush loop: wakes on the scheduled delay, on the batch-size signal,
    /// or on shutdown (which performs a final drain before exiting).
    async fn run(&self) {
        let delay_ms = self.config.read(|c| c.batch.scheduled_delay_ms);
        let mut interval = tokio::time::interval(Duration::from_millis(delay_ms));
        // The first tick fires immediately; consume it so the loop starts
        // with a full delay window.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => self.flush_once().await,
                _ = self.flush_signal.notified() => self.flush_once().await,
                _ = self.shutdown_token.cancelled() => break,
            }
        }

        self.flush_once().await;
        debug!(exporter = self.exporter.name(), "Batch flush loop stopped");
    }

    /// Drain the queue in batch-size chunks, exporting each chunk.
    pub async fn flush_once(&self) {
        loop {
            let batch = self.take_batch();
            if batch.is_empty() {
                return;
            }
            self.export_with_policy(batch).await;
        }
    }

    fn take_batch(&self) -> Vec<Span> {
        let batch_size = self.config.read(|c| c.batch.max_export_batch_size);
        let mut queue = self.queue.lock().expect("span queue poisoned");
        let take = batch_size.min(queue.len());
        queue.drain(..take).collect()
    }

    /// Export one batch, honoring the per-attempt timeout and the
    /// configured retry policy. The batch is dropped (and counted) once
    /// its attempts are exhausted; it is never re-queued.
    async fn export_with_policy(&self, batch: Vec<Span>) {
        let (timeout_ms, retry) = self
            .config
            .read(|c| (c.batch.export_timeout_ms, c.batch.retry));
        let timeout = Duration::from_millis(timeout_ms);
        let exporter_name = self.exporter.name();
        let mut attempt: u32 = 0;

        loop {
            let reason = match tokio::time::timeout(timeout, self.exporter.export(&batch)).await {
                Ok(Ok(())) => {
                    self.metrics.record_exported(exporter_name, batch.len() as u64);
                    return;
                }
                Ok(Err(e)) => {
                    warn!(exporter = exporter_name, error = %e, "Span export failed");
                    "export_failed"
                }
                Err(_) => {
                    warn!(
                        exporter = exporter_name,
                        timeout_ms, "Span export timed out"
                    );
                    "export_timeout"
                }
            };
            self.metrics.record_export_failure(exporter_name);

            match retry {
                RetryPolicy::Backoff { max_retries } if attempt < max_retries => {
                    attempt += 1;
                    let backoff = Duration::from_millis(200u64 << attempt.min(6));
                    tokio::time::sleep(backoff).await;
                }
                _ => {
                    self.metrics.record_dropped(reason, batch.len() as u64);
                    debug!(
                        exporter = exporter_name,
                        spans = batch.len(),
                        reason,
                        "Dropping failed batch"
                    );
                    return;
                }
            }
        }
    }

    /// Stop the flush loop, drain remaining spans and shut the exporter
    /// down. Safe to call whether or not [`start`] ran.
    ///
    /// [`start`]: BatchProcessor::start
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
                    warn!("Batch flush task panicked during shutdown");
                }
            }
            // Loop never ran; drain inline so queued spans still go out.
            None => self.flush_once().await,
        }

        if let Err(e) = self.exporter.shutdown().await {
            warn!(exporter = self.exporter.name(), error = %e, "Exporter shutdown failed");
        }
    }
}
