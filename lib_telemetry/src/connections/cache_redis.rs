//! # Redis Storage Implementation
//!
//! Provides an async `StorageAdapter` backed by Redis string keys.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};

use crate::adapters::{StorageAdapter, StorageError};

/// Prefix applied to every logical key unless another one is given.
pub const DEFAULT_KEY_PREFIX: &str = "telemetry:";

/// A storage adapter keeping each slot in its own Redis key.
pub struct RedisStore {
    /// Shared connection; cloned per command.
    conn: ConnectionManager,
    /// Namespace prepended to logical keys.
    prefix: String,
}

impl RedisStore {
    /// Connects with the default key prefix.
    ///
    /// # Arguments
    /// * `url` - The redis URL (e.g., "redis://127.0.0.1/").
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        Self::connect_with_prefix(url, DEFAULT_KEY_PREFIX).await
    }

    /// Connects and namespaces keys under `prefix`.
    pub async fn connect_with_prefix(url: &str, prefix: &str) -> Result<Self, StorageError> {
        // Open the client and establish the managed connection
        let client = Client::open(url).map_err(backend_error)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(backend_error)?;
        log::info!("Connected to Redis storage at {}", url);
        Ok(Self {
            conn,
            prefix: prefix.to_string(),
        })
    }

    fn namespaced(&self, key: &str) -> String {
        namespaced(&self.prefix, key)
    }
}

#[async_trait]
impl StorageAdapter for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut conn = self.conn.clone();
        conn.get(self.namespaced(key)).await.map_err(backend_error)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(self.namespaced(key), value)
            .await
            .map_err(backend_error)
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.namespaced(key))
            .await
            .map_err(backend_error)
    }
}

fn namespaced(prefix: &str, key: &str) -> String {
    format!("{}{}", prefix, key)
}

fn backend_error(e: RedisError) -> StorageError {
    StorageError::BackendError(format!("redis: {}", e))
}
