use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::core::config::{
    ConfigError, TelemetryConfig, DEFAULT_API_ENDPOINT, DEFAULT_BATCH_SIZE,
    DEFAULT_FLUSH_INTERVAL_MS, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_SHUTDOWN_TIMEOUT_MS,
};

/// Settings file looked up in the working directory when no path is given.
pub const DEFAULT_SETTINGS_FILE: &str = "telemetry.conf";

/// Where the engine keeps its identity slots and queue snapshot.
#[derive(ValueEnum, Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local map; nothing survives a restart.
    Memory,
    /// JSON document on disk (`storagePath`).
    File,
    /// Redis (`redisUrl`); needs the `connections` feature.
    Redis,
}

/// # Telemetry Settings
///
/// Every field is optional so that layers can be merged: defaults, then the
/// JSON settings file, then environment variables and flags.
#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[command(about = "Telemetry delivery settings", version)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySettings {
    /// Path to the JSON settings file.
    #[arg(long, env = "TELEMETRY_CONFIG_PATH", help = "Path to the JSON settings file.")]
    pub config_path: Option<PathBuf>,

    /// Base URL of the ingest endpoint.
    #[arg(long, env = "TELEMETRY_API_ENDPOINT", help = "Base URL of the ingest endpoint.")]
    pub api_endpoint: Option<String>,

    /// Queue length that triggers an immediate flush.
    #[arg(long, env = "TELEMETRY_BATCH_SIZE", help = "Queue length that triggers an immediate flush.")]
    pub batch_size: Option<usize>,

    /// Periodic flush interval in milliseconds.
    #[arg(long, env = "TELEMETRY_FLUSH_INTERVAL_MS", help = "Periodic flush interval in milliseconds.")]
    pub flush_interval_ms: Option<u64>,

    /// Master switch (true/false).
    #[arg(long, env = "TELEMETRY_ENABLED", action = clap::ArgAction::Set, help = "Master switch (true/false).")]
    pub enabled: Option<bool>,

    /// Drop the oldest events beyond this many.
    #[arg(long, env = "TELEMETRY_MAX_QUEUE_SIZE", help = "Drop the oldest events beyond this many.")]
    pub max_queue_size: Option<usize>,

    /// Drop events refused with a non-retryable status (true/false).
    #[arg(long, env = "TELEMETRY_DROP_REJECTED_EVENTS", action = clap::ArgAction::Set, help = "Drop events refused with a non-retryable status (true/false).")]
    pub drop_rejected_events: Option<bool>,

    /// Per-request timeout in milliseconds.
    #[arg(long, env = "TELEMETRY_REQUEST_TIMEOUT_MS", help = "Per-request timeout in milliseconds.")]
    pub request_timeout_ms: Option<u64>,

    /// Transient-failure retries within one send.
    #[arg(long, env = "TELEMETRY_HTTP_MAX_RETRIES", help = "Transient-failure retries within one send.")]
    pub http_max_retries: Option<u32>,

    /// How long shutdown waits for the final flush, in milliseconds.
    #[arg(long, env = "TELEMETRY_SHUTDOWN_TIMEOUT_MS", help = "How long shutdown waits for the final flush, in milliseconds.")]
    pub shutdown_timeout_ms: Option<u64>,

    /// Storage backend (memory, file, redis).
    #[arg(long, value_enum, env = "TELEMETRY_STORAGE", help = "Storage backend (memory, file, redis).")]
    pub storage: Option<StorageBackend>,

    /// JSON file used by the file storage backend.
    #[arg(long, env = "TELEMETRY_STORAGE_PATH", help = "JSON file used by the file storage backend.")]
    pub storage_path: Option<PathBuf>,

    /// Redis URL used by the redis storage backend.
    #[arg(long, env = "TELEMETRY_REDIS_URL", help = "Redis URL used by the redis storage backend.")]
    pub redis_url: Option<String>,

    /// Directory for log files.
    #[arg(long, env = "TELEMETRY_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    /// Logging level (trace, debug, info, warn, error).
    #[arg(long, env = "TELEMETRY_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,
}

impl TelemetrySettings {
    /// Built-in defaults, the bottom layer.
    pub fn defaults() -> Self {
        Self {
            api_endpoint: Some(DEFAULT_API_ENDPOINT.to_string()),
            batch_size: Some(DEFAULT_BATCH_SIZE),
            flush_interval_ms: Some(DEFAULT_FLUSH_INTERVAL_MS),
            enabled: Some(true),
            drop_rejected_events: Some(false),
            request_timeout_ms: Some(DEFAULT_REQUEST_TIMEOUT_MS),
            http_max_retries: Some(0),
            shutdown_timeout_ms: Some(DEFAULT_SHUTDOWN_TIMEOUT_MS),
            storage: Some(StorageBackend::File),
            storage_path: Some(default_storage_path()),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            ..Default::default()
        }
    }

    /// Merges two layers; `other` overrides `self` wherever it is `Some`.
    pub fn merge(self, other: TelemetrySettings) -> TelemetrySettings {
        TelemetrySettings {
            config_path: other.config_path.or(self.config_path),
            api_endpoint: other.api_endpoint.or(self.api_endpoint),
            batch_size: other.batch_size.or(self.batch_size),
            flush_interval_ms: other.flush_interval_ms.or(self.flush_interval_ms),
            enabled: other.enabled.or(self.enabled),
            max_queue_size: other.max_queue_size.or(self.max_queue_size),
            drop_rejected_events: other.drop_rejected_events.or(self.drop_rejected_events),
            request_timeout_ms: other.request_timeout_ms.or(self.request_timeout_ms),
            http_max_retries: other.http_max_retries.or(self.http_max_retries),
            shutdown_timeout_ms: other.shutdown_timeout_ms.or(self.shutdown_timeout_ms),
            storage: other.storage.or(self.storage),
            storage_path: other.storage_path.or(self.storage_path),
            redis_url: other.redis_url.or(self.redis_url),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
        }
    }

    /// Reads one settings layer from a JSON file.
    pub fn from_file(path: &Path) -> Result<TelemetrySettings, ConfigError> {
        let file_error = |reason: String| ConfigError::FileError {
            path: path.display().to_string(),
            reason,
        };
        let raw = fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| file_error(e.to_string()))
    }

    /// Layers already-parsed flags/environment (`cli`) over the settings file
    /// and the defaults. A missing settings file is not an error; an
    /// unreadable or malformed one is.
    pub fn layered(cli: TelemetrySettings) -> Result<TelemetrySettings, ConfigError> {
        // 1. Defaults
        let mut settings = Self::defaults();

        // 2. Settings file, when present
        let file_path = cli
            .config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));
        if file_path.exists() {
            settings = settings.merge(Self::from_file(&file_path)?);
        } else {
            log::info!(
                "Settings file not found at {}. Using defaults and environment/CLI values.",
                file_path.display()
            );
        }

        // 3. Environment and flags
        Ok(settings.merge(cli))
    }

    /// Validates the merged settings into an engine configuration. Unset
    /// values fall back to the defaults.
    pub fn into_config(&self) -> Result<TelemetryConfig, ConfigError> {
        let defaults = TelemetryConfig::default();
        let config = TelemetryConfig {
            api_endpoint: self
                .api_endpoint
                .clone()
                .unwrap_or(defaults.api_endpoint),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            flush_interval_ms: self.flush_interval_ms.unwrap_or(defaults.flush_interval_ms),
            enabled: self.enabled.unwrap_or(defaults.enabled),
            max_queue_size: self.max_queue_size.or(defaults.max_queue_size),
            drop_rejected_events: self
                .drop_rejected_events
                .unwrap_or(defaults.drop_rejected_events),
            request_timeout_ms: self.request_timeout_ms.unwrap_or(defaults.request_timeout_ms),
            http_max_retries: self.http_max_retries.unwrap_or(defaults.http_max_retries),
            shutdown_timeout_ms: self
                .shutdown_timeout_ms
                .unwrap_or(defaults.shutdown_timeout_ms),
        };
        config.validate()?;
        Ok(config)
    }

    /// Effective storage backend.
    pub fn storage_backend(&self) -> StorageBackend {
        self.storage.unwrap_or(StorageBackend::File)
    }
}

/// `<local data dir>/lib_telemetry/telemetry.json`, or `./telemetry.json`
/// when the platform has no data directory.
pub fn default_storage_path() -> PathBuf {
    match dirs::data_local_dir() {
        Some(dir) => dir.join("lib_telemetry").join("telemetry.json"),
        None => {
            log::warn!("Could not determine local data directory; storing telemetry in ./telemetry.json");
            PathBuf::from("telemetry.json")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn later_layers_override_earlier_ones() {
        let base = TelemetrySettings {
            batch_size: Some(10),
            api_endpoint: Some("http://a/telemetry".into()),
            ..Default::default()
        };
        let top = TelemetrySettings {
            batch_size: Some(3),
            ..Default::default()
        };
        let merged = base.merge(top);
        assert_eq!(merged.batch_size, Some(3));
        assert_eq!(merged.api_endpoint.as_deref(), Some("http://a/telemetry"));
    }

    #[test]
    fn file_layer_sits_between_defaults_and_cli() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"apiEndpoint": "https://ingest.example.com/telemetry", "batchSize": 25, "storage": "memory"}}"#
        )
        .unwrap();

        let cli = TelemetrySettings {
            config_path: Some(file.path().to_path_buf()),
            batch_size: Some(5),
            ..Default::default()
        };
        let settings = TelemetrySettings::layered(cli).unwrap();

        assert_eq!(
            settings.api_endpoint.as_deref(),
            Some("https://ingest.example.com/telemetry")
        );
        assert_eq!(settings.batch_size, Some(5));
        assert_eq!(settings.flush_interval_ms, Some(DEFAULT_FLUSH_INTERVAL_MS));
        assert_eq!(settings.storage_backend(), StorageBackend::Memory);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let cli = TelemetrySettings {
            config_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        assert!(matches!(
            TelemetrySettings::layered(cli),
            Err(ConfigError::FileError { .. })
        ));
    }

    #[test]
    fn flags_parse_into_settings() {
        let settings = TelemetrySettings::parse_from([
            "telemetry",
            "--batch-size",
            "2",
            "--enabled",
            "false",
            "--storage",
            "redis",
        ]);
        assert_eq!(settings.batch_size, Some(2));
        assert_eq!(settings.enabled, Some(false));
        assert_eq!(settings.storage, Some(StorageBackend::Redis));
    }

    #[test]
    fn into_config_validates() {
        let config = TelemetrySettings::defaults().into_config().unwrap();
        assert_eq!(config, TelemetryConfig::default());

        let bad = TelemetrySettings {
            flush_interval_ms: Some(0),
            ..TelemetrySettings::defaults()
        };
        assert_eq!(
            bad.into_config(),
            Err(ConfigError::NotPositive("flushIntervalMs"))
        );
    }
}
