//! Lifecycle transitions and the install/activate phase work.

use futures::future;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::cache::CacheStorage;
use crate::config::WorkerConfig;
use crate::fetch::FetchRequest;
use crate::net::NetworkBackend;
use crate::store::DiskStore;
use crate::{ServiceWorkerError, WorkerState};

// ==================== Transitions ====================

/// Whether a worker may move between two states.
pub fn can_transition(from: WorkerState, to: WorkerState) -> bool {
    match (from, to) {
        // Redundant is terminal.
        (WorkerState::Redundant, _) => false,
        // Any live state can be retired.
        (_, WorkerState::Redundant) => true,
        (WorkerState::Parsed, WorkerState::Installing) => true,
        (WorkerState::Installing, WorkerState::Installed) => true,
        (WorkerState::Installed, WorkerState::Activating) => true,
        (WorkerState::Activating, WorkerState::Activated) => true,
        _ => false,
    }
}

// ==================== Install ====================

/// Fetch every manifest asset and seed a fresh cache generation.
///
/// Every asset must come back 2xx. Any failure aborts the install and
/// leaves the generation absent.
pub async fn seed_generation(
    config: &WorkerConfig,
    storage: &RwLock<CacheStorage>,
    backend: &dyn NetworkBackend,
) -> Result<usize, ServiceWorkerError> {
    let requests = config
        .precache_manifest
        .iter()
        .map(|path| config.resolve(path).map(FetchRequest::get))
        .collect::<Result<Vec<_>, _>>()?;

    let entries = future::try_join_all(requests.iter().map(|request| async move {
        let response = backend.fetch(request).await?;
        if !response.is_success() {
            return Err(ServiceWorkerError::InstallFailed(format!(
                "{} returned status {}",
                request.url, response.status
            )));
        }
        Ok(response.to_entry(request))
    }))
    .await?;

    let count = entries.len();
    let mut storage = storage.write().await;
    storage.open(&config.cache_name).insert_all(entries);

    info!(cache = %config.cache_name, assets = count, "cache generation seeded");
    Ok(count)
}

// ==================== Activate ====================

/// Delete every generation other than the configured one.
///
/// Disk snapshots go first. A generation whose snapshot cannot be removed
/// stays in memory so a later activation can retry. Returns the names of
/// the generations actually deleted.
pub async fn sweep_stale_generations(
    config: &WorkerConfig,
    storage: &RwLock<CacheStorage>,
    disk: Option<&DiskStore>,
) -> Vec<String> {
    let stale: Vec<String> = {
        let storage = storage.read().await;
        storage
            .keys()
            .into_iter()
            .filter(|name| name != &config.cache_name)
            .collect()
    };

    if stale.is_empty() {
        return Vec::new();
    }

    let mut removable = Vec::with_capacity(stale.len());
    match disk {
        Some(disk) => {
            let results = future::join_all(stale.iter().map(|name| disk.remove(name))).await;
            for (name, result) in stale.into_iter().zip(results) {
                match result {
                    Ok(()) => removable.push(name),
                    Err(e) => warn!(cache = %name, error = %e, "stale snapshot not removed"),
                }
            }
        }
        None => removable = stale,
    }

    let mut deleted = Vec::with_capacity(removable.len());
    let mut storage = storage.write().await;
    for name in removable {
        if storage.delete(&name) {
            deleted.push(name);
        }
    }
    deleted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;
    use crate::fetch::FetchResponse;
    use futures::future::BoxFuture;
    use hashbrown::HashMap;
    use url::Url;

    struct StaticBackend {
        pages: HashMap<String, Vec<u8>>,
    }

    impl StaticBackend {
        fn new(pages: &[(&str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(path, body)| (path.to_string(), body.as_bytes().to_vec()))
                    .collect(),
            }
        }
    }

    impl NetworkBackend for StaticBackend {
        fn fetch<'a>(
            &'a self,
            request: &'a FetchRequest,
        ) -> BoxFuture<'a, Result<FetchResponse, ServiceWorkerError>> {
            Box::pin(async move {
                match self.pages.get(request.url.path()) {
                    Some(body) => Ok(FetchResponse::ok(body.clone())),
                    None => {
                        let mut response = FetchResponse::ok(Vec::new());
                        response.status = 404;
                        response.status_text = "Not Found".to_string();
                        Ok(response)
                    }
                }
            })
        }
    }

    fn config(cache_name: &str, manifest: &[&str]) -> WorkerConfig {
        WorkerConfig::new(
            cache_name,
            Url::parse("https://app.example").unwrap(),
            manifest,
        )
    }

    fn entry(url: &str) -> CacheEntry {
        CacheEntry {
            url: url.to_string(),
            method: "GET".to_string(),
            status: 200,
            status_text: "OK".to_string(),
            headers: HashMap::new(),
            body: b"cached".to_vec(),
            cached_at: 0,
        }
    }

    #[test]
    fn test_transition_matrix() {
        let happy_path = [
            WorkerState::Parsed,
            WorkerState::Installing,
            WorkerState::Installed,
            WorkerState::Activating,
            WorkerState::Activated,
        ];
        for pair in happy_path.windows(2) {
            assert!(can_transition(pair[0], pair[1]));
        }

        // No skipping phases.
        assert!(!can_transition(WorkerState::Parsed, WorkerState::Installed));
        assert!(!can_transition(
            WorkerState::Installed,
            WorkerState::Activated
        ));
        assert!(!can_transition(WorkerState::Activated, WorkerState::Parsed));

        // Redundant is reachable from anywhere and terminal.
        for state in happy_path {
            assert!(can_transition(state, WorkerState::Redundant));
        }
        assert!(!can_transition(
            WorkerState::Redundant,
            WorkerState::Installing
        ));
        assert!(!can_transition(
            WorkerState::Redundant,
            WorkerState::Redundant
        ));
    }

    #[tokio::test]
    async fn test_seed_generation_populates_cache() {
        let config = config("app-v1", &["/", "/index.html"]);
        let storage = RwLock::new(CacheStorage::new());
        let backend = StaticBackend::new(&[("/", "root"), ("/index.html", "index")]);

        let count = seed_generation(&config, &storage, &backend).await.unwrap();
        assert_eq!(count, 2);

        let storage = storage.read().await;
        let cache = storage.get("app-v1").unwrap();
        assert_eq!(cache.len(), 2);

        let key = FetchRequest::get(config.resolve("/index.html").unwrap()).cache_key();
        assert_eq!(cache.match_request(&key).unwrap().body, b"index");
    }

    #[tokio::test]
    async fn test_seed_generation_failure_leaves_generation_absent() {
        let config = config("app-v1", &["/", "/missing.js"]);
        let storage = RwLock::new(CacheStorage::new());
        let backend = StaticBackend::new(&[("/", "root")]);

        let result = seed_generation(&config, &storage, &backend).await;
        assert!(matches!(result, Err(ServiceWorkerError::InstallFailed(_))));
        assert!(!storage.read().await.has("app-v1"));
    }

    #[tokio::test]
    async fn test_sweep_removes_stale_generations() {
        let config = config("app-v2", &[]);
        let storage = RwLock::new(CacheStorage::new());
        {
            let mut storage = storage.write().await;
            storage.open("app-v1").put(entry("https://app.example/"));
            storage.open("app-v2").put(entry("https://app.example/"));
        }

        let deleted = sweep_stale_generations(&config, &storage, None).await;
        assert_eq!(deleted, vec!["app-v1".to_string()]);

        let storage = storage.read().await;
        assert!(storage.has("app-v2"));
        assert!(!storage.has("app-v1"));
    }

    #[tokio::test]
    async fn test_sweep_removes_disk_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskStore::open(dir.path()).await.unwrap();

        let config = config("app-v2", &[]);
        let storage = RwLock::new(CacheStorage::new());
        {
            let mut storage = storage.write().await;
            storage.open("app-v1").put(entry("https://app.example/"));
            storage.open("app-v2").put(entry("https://app.example/"));
            disk.flush(storage.get("app-v1").unwrap()).await.unwrap();
            disk.flush(storage.get("app-v2").unwrap()).await.unwrap();
        }

        let deleted = sweep_stale_generations(&config, &storage, Some(&disk)).await;
        assert_eq!(deleted, vec!["app-v1".to_string()]);

        let reloaded = disk.load().await.unwrap();
        assert!(reloaded.has("app-v2"));
        assert!(!reloaded.has("app-v1"));
    }
}
