//! # PWAKit Service Worker
//!
//! Offline-first service worker scope for PWAKit web deployments.
//!
//! ## Features
//!
//! - **Lifecycle**: install seeds a versioned cache generation, activate sweeps stale ones
//! - **Fetch interception**: cache-first with background refresh, or network-first with cache fallback
//! - **Cache API**: named generations of request/response snapshots, optional disk persistence
//! - **Clients API**: claim, broadcast to, focus, and open controlled pages
//! - **Notifications**: push payload mapping with dedup tags and click routing
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorkerScope
//!     ├── WorkerConfig (immutable, per deployment)
//!     ├── CacheStorage ── Cache (current generation)
//!     │        └── DiskStore (optional JSON snapshots)
//!     ├── NetworkBackend (reqwest or scripted)
//!     ├── Clients (controlled pages)
//!     └── NotificationCenter (visible notifications by tag)
//!
//! WorkerEvent ──► handle_event ──► EventOutcome
//!     Install │ Activate │ Fetch │ Message │ Push │ NotificationClick
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod cache;
pub mod clients;
pub mod config;
pub mod events;
pub mod fetch;
pub mod lifecycle;
pub mod messages;
pub mod net;
pub mod notifications;
pub mod store;
pub mod worker;

pub use cache::{Cache, CacheEntry, CacheKey, CacheStorage};
pub use clients::{Client, ClientId, Clients};
pub use config::{FetchStrategy, NotificationConfig, PushConfig, WorkerConfig};
pub use events::{EventOutcome, NotificationClick, TaskGuard, WorkerEvent};
pub use fetch::{FetchOutcome, FetchRequest, FetchResponse};
pub use messages::{MessageEvent, OutboundMessage, PageCommand, StatusReply};
pub use net::{HttpBackend, NetworkBackend};
pub use notifications::{
    Notification, NotificationCenter, NotificationData, PushCapability, PushPayload,
};
pub use store::DiskStore;
pub use worker::ServiceWorkerScope;

// ==================== Errors ====================

/// Errors that can occur in service worker operations.
#[derive(Error, Debug, Clone)]
pub enum ServiceWorkerError {
    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

// ==================== Types ====================

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    /// Initial state, configuration loaded.
    Parsed,
    /// Installing (seeding the cache generation).
    Installing,
    /// Installed and ready for activation.
    Installed,
    /// Activating (sweeping stale generations, claiming pages).
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Redundant (replaced or install failed).
    Redundant,
}

impl Default for WorkerState {
    fn default() -> Self {
        Self::Parsed
    }
}

impl WorkerState {
    /// Short name for logs and summaries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Redundant => "redundant",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_state_default() {
        assert_eq!(WorkerState::default(), WorkerState::Parsed);
    }

    #[test]
    fn test_worker_state_as_str() {
        assert_eq!(WorkerState::Activated.as_str(), "activated");
        assert_eq!(WorkerState::Redundant.as_str(), "redundant");
    }

    #[test]
    fn test_error_display() {
        let err = ServiceWorkerError::InstallFailed("manifest fetch".to_string());
        assert_eq!(err.to_string(), "Install failed: manifest fetch");

        let err = ServiceWorkerError::NetworkError("offline".to_string());
        assert_eq!(err.to_string(), "Network error: offline");
    }
}
