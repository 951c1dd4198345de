//! # JSON File Store
//!
//! Persists all keys in a single JSON object on disk. The document is read once
//! on first access and cached; every mutation rewrites it through a temporary
//! sibling file followed by a rename, so a crash mid-write leaves either the
//! old or the new document, never a torn one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;

use super::storage::{StorageAdapter, StorageError};

/// Storage backed by one JSON document of key → string.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    /// `None` until the document has been loaded from disk.
    cache: Mutex<Option<BTreeMap<String, String>>>,
}

impl FileStore {
    /// Creates a store for `path`. The file and its parent directory are
    /// created on the first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    /// Location of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling used for atomic rewrites: the full file name plus `.tmp`.
    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn load(path: &Path) -> Result<BTreeMap<String, String>, StorageError> {
        match fs::read_to_string(path).await {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => match serde_json::from_str(&text) {
                Ok(map) => Ok(map),
                Err(e) => {
                    log::error!(
                        "Storage file {} is not a valid JSON object ({}). Starting empty.",
                        path.display(),
                        e
                    );
                    Ok(BTreeMap::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(StorageError::IoError(e)),
        }
    }

    async fn write(&self, map: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let body = serde_json::to_vec_pretty(map)?;
        let tmp = self.temp_path();
        fs::write(&tmp, body).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(Self::load(&self.path).await?);
        }
        Ok(cache.as_ref().and_then(|map| map.get(key).cloned()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut cache = self.cache.lock().await;
        let mut map = match cache.take() {
            Some(map) => map,
            None => Self::load(&self.path).await?,
        };
        map.insert(key.to_string(), value.to_string());
        let written = self.write(&map).await;
        // Keep the in-memory view even if the disk write failed.
        *cache = Some(map);
        written
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut cache = self.cache.lock().await;
        let mut map = match cache.take() {
            Some(map) => map,
            None => Self::load(&self.path).await?,
        };
        let existed = map.remove(key).is_some();
        let written = if existed { self.write(&map).await } else { Ok(()) };
        *cache = Some(map);
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn values_survive_a_new_instance() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("telemetry.json");

        let store = FileStore::new(&path);
        store.set("@telemetry_user_id", "u-1").await.unwrap();
        store.set("other", "x").await.unwrap();
        store.remove("other").await.unwrap();
        drop(store);

        let reopened = FileStore::new(&path);
        assert_eq!(
            reopened.get("@telemetry_user_id").await.unwrap().as_deref(),
            Some("u-1")
        );
        assert_eq!(reopened.get("other").await.unwrap(), None);
        assert!(!reopened.temp_path().exists());
    }

    #[tokio::test]
    async fn corrupt_document_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("telemetry.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = FileStore::new(&path);
        assert_eq!(store.get("anything").await.unwrap(), None);

        store.set("k", "v").await.unwrap();
        let on_disk: BTreeMap<String, String> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.get("k").map(String::as_str), Some("v"));
    }

    #[tokio::test]
    async fn stores_sharing_a_stem_do_not_share_a_temp_file() {
        let dir = tempdir().unwrap();
        let json = FileStore::new(dir.path().join("slots.json"));
        let txt = FileStore::new(dir.path().join("slots.txt"));
        assert_ne!(json.temp_path(), txt.temp_path());
        assert_eq!(json.temp_path(), dir.path().join("slots.json.tmp"));

        json.set("k", "json").await.unwrap();
        txt.set("k", "txt").await.unwrap();

        assert_eq!(json.path(), dir.path().join("slots.json"));
        assert_eq!(
            FileStore::new(json.path()).get("k").await.unwrap().as_deref(),
            Some("json")
        );
        assert_eq!(
            FileStore::new(txt.path()).get("k").await.unwrap().as_deref(),
            Some("txt")
        );
    }
}
