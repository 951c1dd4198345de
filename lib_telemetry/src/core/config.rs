//! # Engine Configuration
//!
//! `TelemetryConfig` is fixed once an engine is constructed. Build one with
//! `TelemetryConfig::new` and the `with_*` methods, or from layered settings
//! via `configs::TelemetrySettings::into_config`. `validate` is run by the
//! engine constructor.

use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Default ingest base URL.
pub const DEFAULT_API_ENDPOINT: &str = "http://localhost:3000/telemetry";
/// Default queue length that triggers an immediate flush.
pub const DEFAULT_BATCH_SIZE: usize = 10;
/// Default periodic flush interval in milliseconds.
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 30_000;
/// Default per-request timeout in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
/// Default bound on the final flush awaited by `destroy`.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;

/// Configuration violations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The endpoint is not an absolute URL.
    #[error("Invalid API endpoint '{0}': {1}")]
    InvalidEndpoint(String, String),

    /// A numeric setting that must be positive was zero.
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),

    /// A setting had a value outside its accepted set.
    #[error("Invalid value for {field}: {value}")]
    InvalidValue {
        /// Setting name.
        field: &'static str,
        /// Rejected value.
        value: String,
    },

    /// A settings file could not be read or parsed.
    #[error("Failed to load settings from {path}: {reason}")]
    FileError {
        /// File that failed.
        path: String,
        /// Underlying cause.
        reason: String,
    },
}

/// Delivery engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryConfig {
    /// Base URL of the ingest endpoint; `event`, `screen-view` and
    /// `performance` are appended to it.
    pub api_endpoint: String,
    /// Queue length at which `track` flushes immediately.
    pub batch_size: usize,
    /// Period of the background flush, in milliseconds.
    pub flush_interval_ms: u64,
    /// Master switch. When false every tracking call is a no-op.
    pub enabled: bool,
    /// Upper bound on queued events; the oldest are dropped beyond it.
    /// `None` keeps the queue unbounded.
    pub max_queue_size: Option<usize>,
    /// Drop events rejected with a non-retryable status (4xx other than 408
    /// and 429) instead of re-queueing them.
    pub drop_rejected_events: bool,
    /// Per-request timeout, in milliseconds.
    pub request_timeout_ms: u64,
    /// Transient-failure retries within a single send.
    pub http_max_retries: u32,
    /// How long `destroy` waits for the final flush, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            enabled: true,
            max_queue_size: None,
            drop_rejected_events: false,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            http_max_retries: 0,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl TelemetryConfig {
    /// Defaults with the given endpoint.
    pub fn new(api_endpoint: impl Into<String>) -> Self {
        Self {
            api_endpoint: api_endpoint.into(),
            ..Self::default()
        }
    }

    /// Sets the batch threshold.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the periodic flush interval in milliseconds.
    pub fn with_flush_interval_ms(mut self, ms: u64) -> Self {
        self.flush_interval_ms = ms;
        self
    }

    /// Enables or disables tracking.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Caps the queue length (drop-oldest).
    pub fn with_max_queue_size(mut self, max: Option<usize>) -> Self {
        self.max_queue_size = max;
        self
    }

    /// Chooses whether non-retryable rejections are dropped.
    pub fn with_drop_rejected_events(mut self, drop: bool) -> Self {
        self.drop_rejected_events = drop;
        self
    }

    /// Periodic flush interval.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Bound on the final flush.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Checks the invariants the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match Url::parse(&self.api_endpoint) {
            Ok(url) if !url.cannot_be_a_base() => {}
            Ok(_) => {
                return Err(ConfigError::InvalidEndpoint(
                    self.api_endpoint.clone(),
                    "cannot be used as a base URL".to_string(),
                ))
            }
            Err(e) => {
                return Err(ConfigError::InvalidEndpoint(
                    self.api_endpoint.clone(),
                    e.to_string(),
                ))
            }
        }
        if self.batch_size == 0 {
            return Err(ConfigError::NotPositive("batchSize"));
        }
        if self.flush_interval_ms == 0 {
            return Err(ConfigError::NotPositive("flushIntervalMs"));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::NotPositive("requestTimeoutMs"));
        }
        if self.max_queue_size == Some(0) {
            return Err(ConfigError::NotPositive("maxQueueSize"));
        }
        Ok(())
    }
}
