//! Configuration module for spanpipe.
//!
//! Provides typed configuration structs that map to the YAML configuration
//! file, with loading, environment-variable overrides, validation, defaults,
//! a builder for programmatic use, and [`ConfigHandle`] — the runtime-mutable
//! handle shared by every pipeline component. Components receive the handle
//! from the composition root; nothing reads configuration ambiently.

use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Deployment environment, controlling exporter defaults and fail-fast
/// behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Local development: console exporter on, network exporter off
    #[default]
    Development,
    /// Release builds: network exporter on, console exporter off
    Production,
}

impl Environment {
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => f.write_str("development"),
            Environment::Production => f.write_str("production"),
        }
    }
}

/// What to do with a batch whose flush attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum RetryPolicy {
    /// Drop the batch after one failed attempt (bounds memory while
    /// offline; the next scheduled flush starts fresh)
    None,
    /// Retry the same batch with exponential backoff, at most
    /// `max_retries` additional attempts, then drop it
    Backoff { max_retries: u32 },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::None
    }
}

/// Top-level configuration for the telemetry pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Logical service name attached to every span.
    pub service_name: String,
    /// Service version attached to every span.
    pub service_version: String,
    /// Deployment environment.
    pub environment: Environment,
    /// Probability (0.0-1.0) that a span is retained for export.
    pub sampling_rate: f64,
    /// Base URL of the trace collector, e.g. `http://localhost:4318`.
    pub export_endpoint: String,
    /// Write each finished span to the console sink.
    pub enable_console_exporter: bool,
    /// Enqueue finished spans for batched network export.
    pub enable_otlp_exporter: bool,
    /// Batch processor settings.
    pub batch: BatchConfig,
    /// Security audit queue settings.
    pub audit: AuditConfig,
}

/// Batch processor and network exporter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Hard cap on buffered finished spans; overflow is dropped and counted.
    pub max_queue_size: usize,
    /// Flush as soon as this many spans are queued.
    pub max_export_batch_size: usize,
    /// Flush at least this often regardless of queue depth.
    pub scheduled_delay_ms: u64,
    /// Ceiling on each flush attempt.
    pub export_timeout_ms: u64,
    /// What to do with a batch whose flush failed.
    pub retry: RetryPolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 2048,
            max_export_batch_size: 512,
            scheduled_delay_ms: 5_000,
            export_timeout_ms: 30_000,
            retry: RetryPolicy::None,
        }
    }
}

/// Security audit logger settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Seconds between audit queue flushes.
    pub flush_interval_secs: u64,
    /// Hard cap on queued audit events.
    pub max_queue_size: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: 30,
            max_queue_size: 256,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "spanpipe".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: Environment::Development,
            sampling_rate: 1.0,
            export_endpoint: "http://localhost:4318".to_string(),
            enable_console_exporter: true,
            enable_otlp_exporter: false,
            batch: BatchConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl TelemetryConfig {
    /// Defaults appropriate for the given environment: development keeps
    /// the console sink and no network export, production the reverse.
    pub fn for_environment(environment: Environment) -> Self {
        let mut config = Self {
            environment,
            ..Self::default()
        };
        match environment {
            Environment::Development => {
                config.enable_console_exporter = true;
                config.enable_otlp_exporter = false;
            }
            Environment::Production => {
                config.enable_console_exporter = false;
                config.enable_otlp_exporter = true;
            }
        }
        config
    }

    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TelemetryConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to defaults on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Apply `SPANPIPE_*` environment-variable overrides on top of the
    /// current values. Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SPANPIPE_SERVICE_NAME") {
            self.service_name = v;
        }
        if let Ok(v) = std::env::var("SPANPIPE_SERVICE_VERSION") {
            self.service_version = v;
        }
        if let Ok(v) = std::env::var("SPANPIPE_EXPORT_ENDPOINT") {
            self.export_endpoint = v;
        }
        if let Ok(v) = std::env::var("SPANPIPE_SAMPLING_RATE") {
            if let Ok(rate) = v.parse::<f64>() {
                self.sampling_rate = rate;
            }
        }
        if let Ok(v) = std::env::var("SPANPIPE_ENVIRONMENT") {
            match v.as_str() {
                "development" => self.environment = Environment::Development,
                "production" => self.environment = Environment::Production,
                _ => {}
            }
        }
        if let Ok(v) = std::env::var("SPANPIPE_ENABLE_CONSOLE_EXPORTER") {
            if let Ok(b) = v.parse::<bool>() {
                self.enable_console_exporter = b;
            }
        }
        if let Ok(v) = std::env::var("SPANPIPE_ENABLE_OTLP_EXPORTER") {
            if let Ok(b) = v.parse::<bool>() {
                self.enable_otlp_exporter = b;
            }
        }
    }
}

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"batch.max_queue_size"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl TelemetryConfig {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.service_name.trim().is_empty() {
            errors.push(ValidationError {
                field: "service_name".into(),
                message: "must not be empty".into(),
            });
        }

        if !(0.0..=1.0).contains(&self.sampling_rate) || self.sampling_rate.is_nan() {
            errors.push(ValidationError {
                field: "sampling_rate".into(),
                message: format!("must be in range 0.0..=1.0, got {}", self.sampling_rate),
            });
        }

        if self.enable_otlp_exporter {
            if self.export_endpoint.trim().is_empty() {
                errors.push(ValidationError {
                    field: "export_endpoint".into(),
                    message: "must be set when the network exporter is enabled".into(),
                });
            } else if !self.export_endpoint.starts_with("http://")
                && !self.export_endpoint.starts_with("https://")
            {
                errors.push(ValidationError {
                    field: "export_endpoint".into(),
                    message: format!("must be an http(s) URL: {}", self.export_endpoint),
                });
            }
        }

        if self.batch.max_queue_size == 0 {
            errors.push(ValidationError {
                field: "batch.max_queue_size".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.batch.max_export_batch_size == 0 {
            errors.push(ValidationError {
                field: "batch.max_export_batch_size".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.batch.max_export_batch_size > self.batch.max_queue_size {
            errors.push(ValidationError {
                field: "batch.max_export_batch_size".into(),
                message: format!(
                    "max_export_batch_size ({}) must not exceed max_queue_size ({})",
                    self.batch.max_export_batch_size, self.batch.max_queue_size
                ),
            });
        }
        if self.batch.scheduled_delay_ms == 0 {
            errors.push(ValidationError {
                field: "batch.scheduled_delay_ms".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.batch.export_timeout_ms == 0 {
            errors.push(ValidationError {
                field: "batch.export_timeout_ms".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.audit.flush_interval_secs == 0 {
            errors.push(ValidationError {
                field: "audit.flush_interval_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.audit.max_queue_size == 0 {
            errors.push(ValidationError {
                field: "audit.max_queue_size".into(),
                message: "must be greater than 0".into(),
            });
        }

        errors
    }
}

/// Builder for constructing a [`TelemetryConfig`] programmatically.
///
/// Starts from [`TelemetryConfig::default`] and allows selective overrides.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: TelemetryConfig,
}

impl ConfigBuilder {
    /// Create a new builder initialised with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.config.service_name = name.into();
        self
    }

    pub fn service_version(mut self, version: impl Into<String>) -> Self {
        self.config.service_version = version.into();
        self
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.config.environment = environment;
        self
    }

    pub fn sampling_rate(mut self, rate: f64) -> Self {
        self.config.sampling_rate = rate;
        self
    }

    pub fn export_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.export_endpoint = endpoint.into();
        self
    }

    pub fn enable_console_exporter(mut self, enabled: bool) -> Self {
        self.config.enable_console_exporter = enabled;
        self
    }

    pub fn enable_otlp_exporter(mut self, enabled: bool) -> Self {
        self.config.enable_otlp_exporter = enabled;
        self
    }

    pub fn batch_max_queue_size(mut self, n: usize) -> Self {
        self.config.batch.max_queue_size = n;
        self
    }

    pub fn batch_max_export_batch_size(mut self, n: usize) -> Self {
        self.config.batch.max_export_batch_size = n;
        self
    }

    pub fn batch_scheduled_delay_ms(mut self, ms: u64) -> Self {
        self.config.batch.scheduled_delay_ms = ms;
        self
    }

    pub fn batch_export_timeout_ms(mut self, ms: u64) -> Self {
        self.config.batch.export_timeout_ms = ms;
        self
    }

    pub fn batch_retry(mut self, retry: RetryPolicy) -> Self {
        self.config.batch.retry = retry;
        self
    }

    pub fn audit_flush_interval_secs(mut self, secs: u64) -> Self {
        self.config.audit.flush_interval_secs = secs;
        self
    }

    pub fn audit_max_queue_size(mut self, n: usize) -> Self {
        self.config.audit.max_queue_size = n;
        self
    }

    /// Consume the builder and return the finished config.
    pub fn build(self) -> TelemetryConfig {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<TelemetryConfig, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

/// Partial configuration applied at runtime via [`ConfigHandle::update`].
///
/// Only the runtime-tunable surface is exposed; batch/audit topology is
/// fixed after the pipeline is wired.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigUpdate {
    pub service_name: Option<String>,
    pub service_version: Option<String>,
    pub environment: Option<Environment>,
    pub sampling_rate: Option<f64>,
    pub export_endpoint: Option<String>,
    pub enable_console_exporter: Option<bool>,
    pub enable_otlp_exporter: Option<bool>,
}

/// Shared, runtime-mutable view of the pipeline configuration.
///
/// Cloning the handle is cheap; all clones observe updates immediately.
/// Reads take a short non-async lock, so the handle is safe to consult on
/// the span-start hot path.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<TelemetryConfig>>,
}

impl ConfigHandle {
    /// Wrap an initial configuration.
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Snapshot the current configuration.
    pub fn current(&self) -> TelemetryConfig {
        self.inner.read().expect("config lock poisoned").clone()
    }

    /// Read a projection of the current configuration without cloning the
    /// whole struct.
    pub fn read<R>(&self, f: impl FnOnce(&TelemetryConfig) -> R) -> R {
        f(&self.inner.read().expect("config lock poisoned"))
    }

    /// Merge a partial update into the live configuration. Fields left as
    /// `None` keep their current values.
    pub fn update(&self, update: ConfigUpdate) {
        let mut config = self.inner.write().expect("config lock poisoned");
        if let Some(v) = update.service_name {
            config.service_name = v;
        }
        if let Some(v) = update.service_version {
            config.service_version = v;
        }
        if let Some(v) = update.environment {
            config.environment = v;
        }
        if let Some(v) = update.sampling_rate {
            config.sampling_rate = v;
        }
        if let Some(v) = update.export_endpoint {
            config.export_endpoint = v;
        }
        if let Some(v) = update.enable_console_exporter {
            config.enable_console_exporter = v;
        }
        if let Some(v) = update.enable_otlp_exporter {
            config.enable_otlp_exporter = v;
        }
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(TelemetryConfig::default())
    }
}
