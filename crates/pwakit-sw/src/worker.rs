//! The service worker scope: lifecycle state, event dispatch, and
//! request serving.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::CacheStorage;
use crate::clients::{ClientId, Clients};
use crate::config::{FetchStrategy, WorkerConfig};
use crate::events::{EventOutcome, NotificationClick, TaskGuard, WorkerEvent};
use crate::fetch::{FetchOutcome, FetchRequest, FetchResponse};
use crate::lifecycle;
use crate::messages::{MessageEvent, OutboundMessage, PageCommand, StatusReply};
use crate::net::NetworkBackend;
use crate::notifications::{Notification, NotificationCenter, PushCapability, PushPayload};
use crate::store::DiskStore;
use crate::{ServiceWorkerError, WorkerState};

// ==================== Scope ====================

/// The scope one worker version runs in.
///
/// Owns the lifecycle state, the cache generations, the connected pages
/// and the visible notifications. Event handlers never tear the scope
/// down themselves; the embedder awaits [`ServiceWorkerScope::settle`]
/// before discarding it so background work registered by handlers can
/// finish.
pub struct ServiceWorkerScope {
    config: Arc<WorkerConfig>,
    state: RwLock<WorkerState>,
    storage: Arc<RwLock<CacheStorage>>,
    disk: Option<Arc<DiskStore>>,
    backend: Arc<dyn NetworkBackend>,
    clients: RwLock<Clients>,
    notifications: NotificationCenter,
    push: Option<PushCapability>,
    skip_waiting: AtomicBool,
    tasks: TaskGuard,
}

impl ServiceWorkerScope {
    /// Create a scope with in-memory cache storage.
    pub fn new(
        config: WorkerConfig,
        backend: Arc<dyn NetworkBackend>,
    ) -> Result<Self, ServiceWorkerError> {
        Self::with_storage(config, backend, CacheStorage::new(), None)
    }

    /// Create a scope persisted under `dir`.
    ///
    /// Existing snapshots are loaded so cached responses survive restarts.
    pub async fn with_disk(
        config: WorkerConfig,
        backend: Arc<dyn NetworkBackend>,
        dir: impl Into<PathBuf>,
    ) -> Result<Self, ServiceWorkerError> {
        let disk = DiskStore::open(dir).await?;
        let storage = disk.load().await?;
        Self::with_storage(config, backend, storage, Some(disk))
    }

    /// Create a scope over prebuilt storage.
    pub fn with_storage(
        config: WorkerConfig,
        backend: Arc<dyn NetworkBackend>,
        storage: CacheStorage,
        disk: Option<DiskStore>,
    ) -> Result<Self, ServiceWorkerError> {
        if config.cache_name.trim().is_empty() {
            return Err(ServiceWorkerError::ConfigError(
                "cache name is empty".to_string(),
            ));
        }
        if config.origin.cannot_be_a_base() {
            return Err(ServiceWorkerError::ConfigError(format!(
                "origin {} cannot serve as a base URL",
                config.origin
            )));
        }

        // Push is optional. A failed registration leaves the capability
        // absent instead of failing the whole scope.
        let push = match &config.push {
            Some(push_config) => match PushCapability::register(push_config) {
                Ok(capability) => Some(capability),
                Err(e) => {
                    warn!(error = %e, "push registration failed, continuing without push");
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            config: Arc::new(config),
            state: RwLock::new(WorkerState::default()),
            storage: Arc::new(RwLock::new(storage)),
            disk: disk.map(Arc::new),
            backend,
            clients: RwLock::new(Clients::new()),
            notifications: NotificationCenter::new(),
            push,
            skip_waiting: AtomicBool::new(false),
            tasks: TaskGuard::new(),
        })
    }

    // ==================== Accessors ====================

    /// Current lifecycle state.
    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    /// Deployment configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Whether the worker reached the Activated state.
    pub async fn is_active(&self) -> bool {
        self.state().await == WorkerState::Activated
    }

    /// Whether push payloads will be displayed.
    pub fn has_push(&self) -> bool {
        self.push.is_some()
    }

    /// Whether this version was asked to take over immediately.
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Guard over background work registered by handlers.
    pub fn tasks(&self) -> &TaskGuard {
        &self.tasks
    }

    /// Wait for registered background work to finish.
    pub async fn settle(&self) {
        self.tasks.settle().await;
    }

    /// Register a page with the scope. Returns its id and the receiver
    /// messages for that page arrive on.
    pub async fn connect_client(
        &self,
        url: Url,
    ) -> (ClientId, mpsc::UnboundedReceiver<OutboundMessage>) {
        self.clients.write().await.connect(url)
    }

    /// Number of connected pages.
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Find a connected page by exact URL.
    pub async fn find_client(&self, url: &Url) -> Option<ClientId> {
        self.clients.read().await.find_by_url(url)
    }

    /// Whether this worker controls the given page.
    pub async fn is_controlled(&self, id: ClientId) -> bool {
        self.clients
            .read()
            .await
            .get(id)
            .map(|client| client.controlled)
            .unwrap_or(false)
    }

    /// Remove a page from the scope.
    pub async fn disconnect_client(&self, id: ClientId) -> bool {
        self.clients.write().await.disconnect(id)
    }

    /// Snapshot of visible notifications.
    pub async fn visible_notifications(&self) -> Vec<Notification> {
        self.notifications.visible().await
    }

    /// Names of the cache generations currently held.
    pub async fn generation_names(&self) -> Vec<String> {
        self.storage.read().await.keys()
    }

    /// Whether a path is cached in the current generation.
    pub async fn has_cached(&self, path: &str) -> Result<bool, ServiceWorkerError> {
        let url = self.config.resolve(path)?;
        let key = FetchRequest::get(url).cache_key();
        let storage = self.storage.read().await;
        Ok(storage
            .get(&self.config.cache_name)
            .and_then(|cache| cache.match_request(&key))
            .is_some())
    }

    // ==================== Event Dispatch ====================

    /// Dispatch one event to the scope.
    pub async fn handle_event(
        &self,
        event: WorkerEvent,
    ) -> Result<EventOutcome, ServiceWorkerError> {
        match event {
            WorkerEvent::Install => {
                self.install().await;
                Ok(EventOutcome::Completed)
            }
            WorkerEvent::Activate => {
                self.activate().await?;
                Ok(EventOutcome::Completed)
            }
            WorkerEvent::Fetch(request) => {
                Ok(EventOutcome::Fetch(self.handle_fetch(&request).await?))
            }
            WorkerEvent::Message(message) => {
                self.handle_message(message).await?;
                Ok(EventOutcome::Completed)
            }
            WorkerEvent::Push(payload) => {
                self.handle_push(payload).await;
                Ok(EventOutcome::Completed)
            }
            WorkerEvent::NotificationClick(click) => {
                self.handle_notification_click(&click).await?;
                Ok(EventOutcome::Completed)
            }
        }
    }

    // ==================== Lifecycle ====================

    /// Run the install phase. Failure retires this version.
    async fn install(&self) {
        if let Err(e) = self.try_install().await {
            error!(error = %e, "install failed, retiring worker");
            if let Err(e) = self.set_state(WorkerState::Redundant).await {
                warn!(error = %e, "could not retire worker");
            }
        }
    }

    async fn try_install(&self) -> Result<(), ServiceWorkerError> {
        self.set_state(WorkerState::Installing).await?;

        let seeded =
            lifecycle::seed_generation(&self.config, &self.storage, self.backend.as_ref()).await?;
        self.flush_generation().await;

        self.set_state(WorkerState::Installed).await?;
        // Take over from older versions without waiting for their pages
        // to close.
        self.skip_waiting.store(true, Ordering::SeqCst);
        info!(cache = %self.config.cache_name, assets = seeded, "worker installed");
        Ok(())
    }

    /// Run the activate phase: sweep stale generations, claim open pages,
    /// announce if configured.
    async fn activate(&self) -> Result<(), ServiceWorkerError> {
        self.set_state(WorkerState::Activating).await?;

        let swept =
            lifecycle::sweep_stale_generations(&self.config, &self.storage, self.disk.as_deref())
                .await;
        if !swept.is_empty() {
            info!(removed = swept.len(), "stale cache generations deleted");
        }

        let claimed = self.clients.write().await.claim();
        debug!(clients = claimed, "open pages claimed");

        self.set_state(WorkerState::Activated).await?;

        if self.config.announce_activation {
            let message = OutboundMessage::Activated {
                message: self.config.activation_message.clone(),
            };
            let delivered = self.clients.read().await.broadcast(&message);
            debug!(clients = delivered, "activation announced");
        }
        info!(cache = %self.config.cache_name, "worker activated");
        Ok(())
    }

    async fn set_state(&self, to: WorkerState) -> Result<(), ServiceWorkerError> {
        let mut state = self.state.write().await;
        if !lifecycle::can_transition(*state, to) {
            return Err(ServiceWorkerError::StateError(format!(
                "cannot transition from {} to {}",
                state.as_str(),
                to.as_str()
            )));
        }
        debug!(from = state.as_str(), to = to.as_str(), "worker state change");
        *state = to;
        Ok(())
    }

    // ==================== Fetch Interception ====================

    /// Decide how to serve an intercepted request.
    ///
    /// Only same-origin GET requests are intercepted; everything else
    /// passes through to the network untouched.
    async fn handle_fetch(
        &self,
        request: &FetchRequest,
    ) -> Result<FetchOutcome, ServiceWorkerError> {
        if !request.is_get() {
            debug!(method = %request.method, url = %request.url, "passthrough: non-GET");
            return Ok(FetchOutcome::Passthrough);
        }
        if !self.config.same_origin(&request.url) {
            debug!(url = %request.url, "passthrough: cross-origin");
            return Ok(FetchOutcome::Passthrough);
        }

        let response = match self.config.strategy {
            FetchStrategy::CacheFirst => self.cache_first(request).await?,
            FetchStrategy::NetworkFirst => self.network_first(request).await?,
        };
        Ok(FetchOutcome::Response(response))
    }

    /// Serve from cache, refreshing the entry in the background. Misses go
    /// to the network.
    async fn cache_first(
        &self,
        request: &FetchRequest,
    ) -> Result<FetchResponse, ServiceWorkerError> {
        if let Some(cached) = self.lookup(request).await {
            debug!(url = %request.url, "cache hit");
            self.spawn_refresh(request.clone()).await;
            return Ok(cached);
        }

        debug!(url = %request.url, "cache miss");
        match self.backend.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.store_response(request, &response).await;
                }
                Ok(response)
            }
            Err(e) => self.offline_fallback(request, e).await,
        }
    }

    /// Go to the network first; fall back to the cached copy when it fails.
    async fn network_first(
        &self,
        request: &FetchRequest,
    ) -> Result<FetchResponse, ServiceWorkerError> {
        match self.backend.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.store_response(request, &response).await;
                }
                Ok(response)
            }
            Err(e) => {
                if let Some(cached) = self.lookup(request).await {
                    debug!(url = %request.url, "network failed, serving cached copy");
                    return Ok(cached);
                }
                self.offline_fallback(request, e).await
            }
        }
    }

    /// Last resort for a request the network cannot serve. Navigations get
    /// the cached root document; everything else propagates the failure.
    async fn offline_fallback(
        &self,
        request: &FetchRequest,
        cause: ServiceWorkerError,
    ) -> Result<FetchResponse, ServiceWorkerError> {
        if request.is_navigation {
            let fallback = FetchRequest::get(self.config.resolve(&self.config.offline_fallback)?);
            if let Some(cached) = self.lookup(&fallback).await {
                info!(
                    url = %request.url,
                    fallback = %self.config.offline_fallback,
                    "serving offline fallback"
                );
                return Ok(cached);
            }
        }
        warn!(url = %request.url, error = %cause, "request failed with no cached copy");
        Err(cause)
    }

    /// Look up a request in the current generation.
    async fn lookup(&self, request: &FetchRequest) -> Option<FetchResponse> {
        let storage = self.storage.read().await;
        storage
            .get(&self.config.cache_name)
            .and_then(|cache| cache.match_request(&request.cache_key()))
            .map(FetchResponse::from_entry)
    }

    /// Store a response in the current generation, then schedule a disk
    /// flush. The entry is visible to lookups before this returns.
    async fn store_response(&self, request: &FetchRequest, response: &FetchResponse) {
        let entry = response.to_entry(request);
        {
            let mut storage = self.storage.write().await;
            storage.open(&self.config.cache_name).put(entry);
        }
        self.schedule_flush().await;
    }

    /// Refresh a cached response from the network in the background.
    ///
    /// The refresh flushes its own snapshot inline; guarded tasks must not
    /// queue more work on the guard they run under.
    async fn spawn_refresh(&self, request: FetchRequest) {
        let backend = self.backend.clone();
        let storage = self.storage.clone();
        let disk = self.disk.clone();
        let name = self.config.cache_name.clone();

        self.tasks
            .spawn(async move {
                match backend.fetch(&request).await {
                    Ok(response) if response.is_cacheable() => {
                        let entry = response.to_entry(&request);
                        {
                            let mut storage = storage.write().await;
                            storage.open(&name).put(entry);
                        }
                        debug!(url = %request.url, "cache entry refreshed");
                        if let Some(disk) = disk.as_deref() {
                            flush_snapshot(disk, &storage, &name).await;
                        }
                    }
                    Ok(response) => {
                        debug!(url = %request.url, status = response.status, "refresh skipped");
                    }
                    Err(e) => {
                        debug!(url = %request.url, error = %e, "refresh failed");
                    }
                }
            })
            .await;
    }

    /// Flush the current generation inline, if persistence is on.
    async fn flush_generation(&self) {
        if let Some(disk) = self.disk.as_deref() {
            flush_snapshot(disk, &self.storage, &self.config.cache_name).await;
        }
    }

    /// Queue a disk flush of the current generation on the task guard.
    async fn schedule_flush(&self) {
        if let Some(disk) = self.disk.clone() {
            let storage = self.storage.clone();
            let name = self.config.cache_name.clone();
            self.tasks
                .spawn(async move {
                    flush_snapshot(&disk, &storage, &name).await;
                })
                .await;
        }
    }

    // ==================== Messaging ====================

    /// Handle a message posted by a page.
    async fn handle_message(&self, event: MessageEvent) -> Result<(), ServiceWorkerError> {
        match event.command() {
            Some(PageCommand::SkipWaiting) => {
                self.skip_waiting.store(true, Ordering::SeqCst);
                info!("skip waiting requested by page");
                if self.state().await == WorkerState::Installed {
                    self.activate().await?;
                }
                Ok(())
            }
            Some(PageCommand::CheckStatus) => {
                let reply = StatusReply {
                    active: true,
                    ready: true,
                };
                match event.reply {
                    Some(port) => {
                        if port.send(reply).is_err() {
                            debug!("status reply port closed");
                        }
                    }
                    None => debug!("status check without reply port"),
                }
                Ok(())
            }
            None => {
                debug!(data = %event.data, "unrecognized page message ignored");
                Ok(())
            }
        }
    }

    // ==================== Push ====================

    /// Display a push payload, if the push capability is present.
    async fn handle_push(&self, payload: PushPayload) {
        if self.push.is_none() {
            debug!("push payload dropped, capability absent");
            return;
        }
        let notification = Notification::from_payload(&payload, &self.config.notifications);
        info!(title = %notification.title, tag = %notification.tag, "showing notification");
        if self.notifications.show(notification).await {
            debug!("earlier notification with same tag replaced");
        }
    }

    /// Route a notification click: close it, then focus an existing page
    /// at the target URL or open a new one.
    async fn handle_notification_click(
        &self,
        click: &NotificationClick,
    ) -> Result<(), ServiceWorkerError> {
        self.notifications.close(&click.tag).await;
        let target = self.config.resolve(&click.url)?;

        let mut clients = self.clients.write().await;
        match clients.find_by_url(&target) {
            Some(id) => {
                clients.focus(id)?;
                info!(url = %target, id = ?id, "focused existing page");
            }
            None => {
                let (id, _receiver) = clients.open_window(target.clone());
                info!(url = %target, id = ?id, "opened new page");
            }
        }
        Ok(())
    }
}

/// Write one generation snapshot, logging failures.
async fn flush_snapshot(disk: &DiskStore, storage: &RwLock<CacheStorage>, name: &str) {
    let result = {
        let storage = storage.read().await;
        match storage.get(name) {
            Some(cache) => disk.flush(cache).await,
            None => return,
        }
    };
    if let Err(e) = result {
        warn!(cache = %name, error = %e, "cache snapshot not written");
    }
}
