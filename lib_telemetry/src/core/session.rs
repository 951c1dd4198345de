//! # Session / Identity Bootstrap
//!
//! Produces the identifiers stamped on every event:
//!
//! - **user id**: generated once, persisted in the user-id slot and reused
//!   across restarts for as long as the slot survives.
//! - **session id**: generated on every initialization. It is written to the
//!   session-id slot for observability but never read back, so each run gets
//!   a new one.
//!
//! The read-modify-write on the user-id slot is not transactional. Two engines
//! bootstrapping concurrently over the same backend can each mint a user id;
//! one process is expected to initialize once.

use crate::adapters::StorageAdapter;
use crate::utils::new_identifier;

/// Storage slot holding the id of the most recent session.
pub const SESSION_ID_KEY: &str = "@telemetry_session_id";
/// Storage slot holding the durable user id.
pub const USER_ID_KEY: &str = "@telemetry_user_id";
/// Storage slot holding the serialized array of undelivered events.
pub const QUEUE_KEY: &str = "@telemetry_queue";

/// Identifiers for one run of the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    /// Durable user identifier.
    pub user_id: String,
    /// Per-run session identifier.
    pub session_id: String,
}

impl SessionIdentity {
    /// Loads or creates the user id and mints a fresh session id.
    ///
    /// Storage failures are logged and never abort the bootstrap: an
    /// unreadable user-id slot yields an in-memory id that is not written
    /// back, so a transient read error cannot overwrite a stored identity.
    pub async fn bootstrap(storage: &dyn StorageAdapter) -> Self {
        let user_id = match storage.get(USER_ID_KEY).await {
            Ok(Some(id)) if !id.trim().is_empty() => id,
            Ok(_) => {
                let id = new_identifier();
                if let Err(e) = storage.set(USER_ID_KEY, &id).await {
                    log::error!("Failed to persist user id: {}", e);
                }
                id
            }
            Err(e) => {
                log::error!("Failed to read user id, using a temporary one: {}", e);
                new_identifier()
            }
        };

        let session_id = new_identifier();
        if let Err(e) = storage.set(SESSION_ID_KEY, &session_id).await {
            log::error!("Failed to persist session id: {}", e);
        }

        Self {
            user_id,
            session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryStore, StorageError};
    use async_trait::async_trait;

    struct FailingStore;

    #[async_trait]
    impl StorageAdapter for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::BackendError("down".into()))
        }
        async fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::BackendError("down".into()))
        }
        async fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::BackendError("down".into()))
        }
    }

    #[tokio::test]
    async fn user_id_is_durable_and_session_id_is_fresh() {
        let store = MemoryStore::new();
        let first = SessionIdentity::bootstrap(&store).await;
        let second = SessionIdentity::bootstrap(&store).await;

        assert_eq!(first.user_id, second.user_id);
        assert_ne!(first.session_id, second.session_id);
        assert_eq!(
            store.get(USER_ID_KEY).await.unwrap().as_deref(),
            Some(first.user_id.as_str())
        );
        assert_eq!(
            store.get(SESSION_ID_KEY).await.unwrap().as_deref(),
            Some(second.session_id.as_str())
        );
    }

    #[tokio::test]
    async fn existing_user_id_is_reused() {
        let store = MemoryStore::new();
        store.set(USER_ID_KEY, "known-user").await.unwrap();
        let identity = SessionIdentity::bootstrap(&store).await;
        assert_eq!(identity.user_id, "known-user");
    }

    #[tokio::test]
    async fn storage_failure_still_yields_identifiers() {
        let identity = SessionIdentity::bootstrap(&FailingStore).await;
        assert!(!identity.user_id.is_empty());
        assert!(!identity.session_id.is_empty());
    }
}
