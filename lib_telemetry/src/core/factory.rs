//! # Engine Factory
//!
//! Assembles a `TelemetryService` from explicit adapters or from layered
//! settings. The storage backend is chosen once, here, from an explicit
//! setting; nothing probes the runtime to guess it.

use std::sync::Arc;

use crate::adapters::{PlatformAdapter, StorageAdapter};
use crate::core::config::TelemetryConfig;
use crate::core::service::{TelemetryError, TelemetryService};

/// Builds an engine over the given storage and platform adapters.
pub fn create_with_adapters(
    config: TelemetryConfig,
    storage: Arc<dyn StorageAdapter>,
    platform: Arc<dyn PlatformAdapter>,
) -> Result<TelemetryService, TelemetryError> {
    TelemetryService::new(config, storage, platform)
}

#[cfg(feature = "configs")]
pub use self::settings::{create_from_settings, open_storage};

#[cfg(feature = "configs")]
mod settings {
    use std::sync::Arc;

    use crate::adapters::{FileStore, MemoryStore, NativePlatformAdapter, StorageAdapter};
    use crate::configs::{StorageBackend, TelemetrySettings};
    use crate::core::config::ConfigError;
    use crate::core::service::{TelemetryError, TelemetryService};

    /// Builds an engine from merged settings, the native platform adapter and
    /// the storage backend the settings name.
    pub async fn create_from_settings(
        settings: &TelemetrySettings,
        app_version: &str,
    ) -> Result<TelemetryService, TelemetryError> {
        let config = settings.into_config()?;
        let storage = open_storage(settings).await?;
        let platform = Arc::new(NativePlatformAdapter::new(app_version));
        super::create_with_adapters(config, storage, platform)
    }

    /// Opens the storage backend selected by `settings.storage`.
    pub async fn open_storage(
        settings: &TelemetrySettings,
    ) -> Result<Arc<dyn StorageAdapter>, TelemetryError> {
        match settings.storage_backend() {
            StorageBackend::Memory => {
                log::info!("Using in-memory telemetry storage");
                Ok(Arc::new(MemoryStore::new()))
            }
            StorageBackend::File => {
                let path = settings
                    .storage_path
                    .clone()
                    .unwrap_or_else(crate::configs::config_telemetry::default_storage_path);
                let store = FileStore::new(path);
                log::info!("Using file telemetry storage at {}", store.path().display());
                Ok(Arc::new(store))
            }
            StorageBackend::Redis => open_redis(settings).await,
        }
    }

    #[cfg(feature = "connections")]
    async fn open_redis(
        settings: &TelemetrySettings,
    ) -> Result<Arc<dyn StorageAdapter>, TelemetryError> {
        let url = settings
            .redis_url
            .as_deref()
            .ok_or(ConfigError::InvalidValue {
                field: "redisUrl",
                value: "<unset>".to_string(),
            })?;
        let store = crate::connections::RedisStore::connect(url).await?;
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "connections"))]
    async fn open_redis(
        _settings: &TelemetrySettings,
    ) -> Result<Arc<dyn StorageAdapter>, TelemetryError> {
        Err(ConfigError::InvalidValue {
            field: "storage",
            value: "redis (built without the `connections` feature)".to_string(),
        }
        .into())
    }

}
