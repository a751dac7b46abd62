//! Disk persistence for cache generations.
//!
//! Each generation is written as one JSON snapshot file under the store
//! root. The worker treats persistence as best-effort: flush failures are
//! logged by callers and never affect request serving.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{Cache, CacheEntry, CacheStorage};
use crate::ServiceWorkerError;

/// Serialized form of one cache generation.
#[derive(Debug, Serialize, Deserialize)]
struct CacheSnapshot {
    name: String,
    entries: Vec<CacheEntry>,
}

/// JSON snapshot store for cache generations.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Open a store rooted at the given directory, creating it if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, ServiceWorkerError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| ServiceWorkerError::StorageError(e.to_string()))?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Snapshot file path for a generation name.
    fn snapshot_path(&self, name: &str) -> PathBuf {
        let sanitized: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        self.root.join(format!("{}.json", sanitized))
    }

    /// Load every readable snapshot into a fresh cache store.
    ///
    /// Unreadable snapshots are skipped with a warning so one corrupt file
    /// cannot keep the worker from starting.
    pub async fn load(&self) -> Result<CacheStorage, ServiceWorkerError> {
        let mut storage = CacheStorage::new();
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| ServiceWorkerError::StorageError(e.to_string()))?;

        while let Some(file) = dir
            .next_entry()
            .await
            .map_err(|e| ServiceWorkerError::StorageError(e.to_string()))?
        {
            let path = file.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| ServiceWorkerError::StorageError(e.to_string()))?;
            let snapshot: CacheSnapshot = match serde_json::from_slice(&bytes) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable cache snapshot");
                    continue;
                }
            };

            debug!(
                generation = %snapshot.name,
                entries = snapshot.entries.len(),
                "loaded cache snapshot"
            );
            storage.insert(Cache::from_entries(&snapshot.name, snapshot.entries));
        }

        Ok(storage)
    }

    /// Write one generation to its snapshot file.
    pub async fn flush(&self, cache: &Cache) -> Result<(), ServiceWorkerError> {
        let snapshot = CacheSnapshot {
            name: cache.name.clone(),
            entries: cache.entries().cloned().collect(),
        };
        let bytes = serde_json::to_vec(&snapshot)
            .map_err(|e| ServiceWorkerError::StorageError(e.to_string()))?;

        tokio::fs::write(self.snapshot_path(&cache.name), bytes)
            .await
            .map_err(|e| ServiceWorkerError::StorageError(e.to_string()))?;
        debug!(generation = %cache.name, entries = cache.len(), "flushed cache snapshot");
        Ok(())
    }

    /// Remove the snapshot file for a generation. Missing files are fine.
    pub async fn remove(&self, name: &str) -> Result<(), ServiceWorkerError> {
        match tokio::fs::remove_file(self.snapshot_path(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ServiceWorkerError::StorageError(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheKey;
    use hashbrown::HashMap;
    use tempfile::tempdir;

    fn entry(url: &str, body: &[u8]) -> CacheEntry {
        CacheEntry {
            url: url.to_string(),
            method: "GET".to_string(),
            status: 200,
            status_text: "OK".to_string(),
            headers: HashMap::new(),
            body: body.to_vec(),
            cached_at: 1,
        }
    }

    #[tokio::test]
    async fn test_flush_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = DiskStore::open(dir.path()).await.unwrap();

        let mut cache = Cache::new("app-v1");
        cache.put(entry("https://app.example/", b"root"));
        cache.put(entry("https://app.example/index.html", b"index"));
        store.flush(&cache).await.unwrap();

        let storage = store.load().await.unwrap();
        let loaded = storage.get("app-v1").unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(
            loaded
                .match_request(&CacheKey::get("https://app.example/"))
                .unwrap()
                .body,
            b"root"
        );
    }

    #[tokio::test]
    async fn test_remove_deletes_snapshot() {
        let dir = tempdir().unwrap();
        let store = DiskStore::open(dir.path()).await.unwrap();

        let mut cache = Cache::new("app-v1");
        cache.put(entry("https://app.example/", b"root"));
        store.flush(&cache).await.unwrap();

        store.remove("app-v1").await.unwrap();
        let storage = store.load().await.unwrap();
        assert!(storage.is_empty());

        // Removing again is not an error.
        store.remove("app-v1").await.unwrap();
    }

    #[tokio::test]
    async fn test_load_skips_unreadable_snapshot() {
        let dir = tempdir().unwrap();
        let store = DiskStore::open(dir.path()).await.unwrap();

        let mut cache = Cache::new("app-v1");
        cache.put(entry("https://app.example/", b"root"));
        store.flush(&cache).await.unwrap();
        std::fs::write(dir.path().join("broken.json"), b"not json").unwrap();

        let storage = store.load().await.unwrap();
        assert_eq!(storage.len(), 1);
        assert!(storage.has("app-v1"));
    }

    #[tokio::test]
    async fn test_snapshot_name_sanitized() {
        let dir = tempdir().unwrap();
        let store = DiskStore::open(dir.path()).await.unwrap();

        let cache = Cache::new("app/v1:latest");
        store.flush(&cache).await.unwrap();

        assert!(dir.path().join("app-v1-latest.json").exists());
        let storage = store.load().await.unwrap();
        assert!(storage.has("app/v1:latest"));
    }
}
