//! # Storage Capability
//!
//! Durable string slots used by the engine for the user id, the session id and
//! the pending-event queue. The engine only needs three named slots and never
//! relies on transactions; every call may fail and the engine degrades to
//! in-memory operation when it does.

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred while reading or writing the backing medium.
    #[error("I/O error occurred: {0}")]
    IoError(#[from] std::io::Error),

    /// The backing document could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    /// The remote key-value service rejected the command or is unreachable.
    #[error("Backend error: {0}")]
    BackendError(String),
}

/// Async key/value string storage.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Returns the stored value, or `None` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}
