//! Deployment configuration for the worker scope.
//!
//! Everything the original deployments kept as module-level constants (cache
//! name, asset manifest, notification defaults) lives in one immutable
//! [`WorkerConfig`] passed to the scope at startup.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::ServiceWorkerError;

/// Caching strategy applied by the request interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchStrategy {
    /// Serve from cache when possible and refresh the entry in the background.
    #[default]
    CacheFirst,
    /// Try the network first and fall back to cache when it fails.
    NetworkFirst,
}

impl FetchStrategy {
    /// Short name for logs and summaries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CacheFirst => "cache-first",
            Self::NetworkFirst => "network-first",
        }
    }
}

/// Immutable configuration for one worker deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Name of the current cache generation. Changing it is the only
    /// supported way to force a full cache bust.
    pub cache_name: String,

    /// Origin controlled by this worker. Requests to other origins pass
    /// through untouched.
    pub origin: Url,

    /// Root-relative paths seeded into a new generation at install.
    pub precache_manifest: Vec<String>,

    /// Caching strategy for intercepted requests.
    #[serde(default)]
    pub strategy: FetchStrategy,

    /// Root-relative path served to navigations when cache and network fail.
    #[serde(default = "default_offline_fallback")]
    pub offline_fallback: String,

    /// Broadcast a message to controlled pages after claiming them.
    #[serde(default)]
    pub announce_activation: bool,

    /// Message text for the activation broadcast.
    #[serde(default = "default_activation_message")]
    pub activation_message: String,

    /// Notification display defaults.
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Push registration credential. Absent means no push capability.
    #[serde(default)]
    pub push: Option<PushConfig>,
}

impl WorkerConfig {
    /// Create a configuration with defaults for everything but the identity
    /// fields.
    pub fn new(cache_name: &str, origin: Url, manifest: &[&str]) -> Self {
        Self {
            cache_name: cache_name.to_string(),
            origin,
            precache_manifest: manifest.iter().map(|p| p.to_string()).collect(),
            strategy: FetchStrategy::default(),
            offline_fallback: default_offline_fallback(),
            announce_activation: false,
            activation_message: default_activation_message(),
            notifications: NotificationConfig::default(),
            push: None,
        }
    }

    /// Set the caching strategy.
    pub fn with_strategy(mut self, strategy: FetchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Enable the activation broadcast.
    pub fn with_announcement(mut self, message: &str) -> Self {
        self.announce_activation = true;
        self.activation_message = message.to_string();
        self
    }

    /// Set the push registration credential.
    pub fn with_push(mut self, push: PushConfig) -> Self {
        self.push = Some(push);
        self
    }

    /// Resolve a root-relative path (or absolute URL) against the
    /// controlling origin.
    pub fn resolve(&self, path: &str) -> Result<Url, ServiceWorkerError> {
        self.origin
            .join(path)
            .map_err(|e| ServiceWorkerError::ConfigError(format!("{}: {}", path, e)))
    }

    /// Check whether a URL belongs to the controlling origin.
    pub fn same_origin(&self, url: &Url) -> bool {
        url.origin() == self.origin.origin()
    }
}

/// Display defaults applied when a push payload omits fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Title used when the payload has none.
    #[serde(default = "default_title")]
    pub default_title: String,

    /// Body used when the payload has none.
    #[serde(default = "default_body")]
    pub default_body: String,

    /// Icon path.
    #[serde(default = "default_icon")]
    pub icon: String,

    /// Badge path.
    #[serde(default = "default_icon")]
    pub badge: String,

    /// Vibration pattern in milliseconds.
    #[serde(default = "default_vibration")]
    pub vibration: Vec<u32>,

    /// Deduplication tag. A new notification replaces a visible one
    /// carrying the same tag.
    #[serde(default = "default_tag")]
    pub tag: String,

    /// Keep the notification visible until the user dismisses it.
    #[serde(default)]
    pub require_interaction: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            default_title: default_title(),
            default_body: default_body(),
            icon: default_icon(),
            badge: default_icon(),
            vibration: default_vibration(),
            tag: default_tag(),
            require_interaction: false,
        }
    }
}

/// Registration credential for the external push collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushConfig {
    /// Sender identifier issued by the push service.
    pub sender_id: String,
}

fn default_offline_fallback() -> String {
    "/index.html".to_string()
}

fn default_activation_message() -> String {
    "Service worker is active and ready".to_string()
}

fn default_title() -> String {
    "Notification".to_string()
}

fn default_body() -> String {
    "New message available".to_string()
}

fn default_icon() -> String {
    "/icon-192.png".to_string()
}

fn default_vibration() -> Vec<u32> {
    vec![200, 100, 200]
}

fn default_tag() -> String {
    "pwa-notification".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("https://app.example").unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = WorkerConfig::new("app-v1", origin(), &["/", "/index.html"]);

        assert_eq!(config.strategy, FetchStrategy::CacheFirst);
        assert_eq!(config.offline_fallback, "/index.html");
        assert!(!config.announce_activation);
        assert!(config.push.is_none());
        assert_eq!(config.precache_manifest.len(), 2);
    }

    #[test]
    fn test_resolve_root_relative() {
        let config = WorkerConfig::new("app-v1", origin(), &[]);

        let url = config.resolve("/index.html").unwrap();
        assert_eq!(url.as_str(), "https://app.example/index.html");
    }

    #[test]
    fn test_resolve_absolute() {
        let config = WorkerConfig::new("app-v1", origin(), &[]);

        let url = config.resolve("https://cdn.example/lib.js").unwrap();
        assert_eq!(url.as_str(), "https://cdn.example/lib.js");
    }

    #[test]
    fn test_same_origin() {
        let config = WorkerConfig::new("app-v1", origin(), &[]);

        let same = Url::parse("https://app.example/page").unwrap();
        let other = Url::parse("https://other.example/page").unwrap();
        let other_port = Url::parse("https://app.example:8443/page").unwrap();

        assert!(config.same_origin(&same));
        assert!(!config.same_origin(&other));
        assert!(!config.same_origin(&other_port));
    }

    #[test]
    fn test_strategy_serde_names() {
        let parsed: FetchStrategy = serde_json::from_str("\"network-first\"").unwrap();
        assert_eq!(parsed, FetchStrategy::NetworkFirst);

        let encoded = serde_json::to_string(&FetchStrategy::CacheFirst).unwrap();
        assert_eq!(encoded, "\"cache-first\"");
    }

    #[test]
    fn test_config_deserialize_fills_defaults() {
        let json = r#"{
            "cache_name": "app-v2",
            "origin": "https://app.example/",
            "precache_manifest": ["/"]
        }"#;

        let config: WorkerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.cache_name, "app-v2");
        assert_eq!(config.strategy, FetchStrategy::CacheFirst);
        assert_eq!(config.notifications.vibration, vec![200, 100, 200]);
        assert_eq!(config.notifications.tag, "pwa-notification");
    }

    #[test]
    fn test_builder_helpers() {
        let config = WorkerConfig::new("app-v1", origin(), &["/"])
            .with_strategy(FetchStrategy::NetworkFirst)
            .with_announcement("ready")
            .with_push(PushConfig {
                sender_id: "sender-1".to_string(),
            });

        assert_eq!(config.strategy, FetchStrategy::NetworkFirst);
        assert!(config.announce_activation);
        assert_eq!(config.activation_message, "ready");
        assert!(config.push.is_some());
    }
}
