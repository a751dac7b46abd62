//! Push payload mapping and notification display state.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use pwakit_common::epoch_millis;

use crate::config::{NotificationConfig, PushConfig};
use crate::ServiceWorkerError;

// ==================== Payloads ====================

/// Push payload delivered by the external collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushPayload {
    /// Optional display fields.
    #[serde(default)]
    pub notification: Option<PushNotification>,

    /// Optional app data.
    #[serde(default)]
    pub data: Option<PushData>,
}

/// Display fields of a push payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushNotification {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

/// App data of a push payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushData {
    #[serde(default)]
    pub url: Option<String>,
}

impl PushPayload {
    /// Parse a payload from raw JSON bytes.
    pub fn from_json(data: &[u8]) -> Result<Self, ServiceWorkerError> {
        serde_json::from_slice(data).map_err(|e| ServiceWorkerError::InvalidPayload(e.to_string()))
    }
}

// ==================== Notifications ====================

/// A display-ready notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Title line.
    pub title: String,

    /// Body text.
    pub body: String,

    /// Icon path.
    pub icon: String,

    /// Badge path.
    pub badge: String,

    /// Vibration pattern in milliseconds.
    pub vibration: Vec<u32>,

    /// Dedup tag. A new notification replaces a visible one with the same tag.
    pub tag: String,

    /// Keep the notification visible until dismissed.
    pub require_interaction: bool,

    /// Click routing data.
    pub data: NotificationData,
}

/// Data attached to a displayed notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationData {
    /// Deep-link target for clicks.
    pub url: String,

    /// When the notification was built (ms since epoch).
    pub timestamp: u64,
}

impl Notification {
    /// Build a notification from a push payload, filling gaps from config.
    pub fn from_payload(payload: &PushPayload, config: &NotificationConfig) -> Self {
        let title = payload
            .notification
            .as_ref()
            .and_then(|n| n.title.clone())
            .unwrap_or_else(|| config.default_title.clone());
        let body = payload
            .notification
            .as_ref()
            .and_then(|n| n.body.clone())
            .unwrap_or_else(|| config.default_body.clone());
        let url = payload
            .data
            .as_ref()
            .and_then(|d| d.url.clone())
            .unwrap_or_else(|| "/".to_string());

        Self {
            title,
            body,
            icon: config.icon.clone(),
            badge: config.badge.clone(),
            vibration: config.vibration.clone(),
            tag: config.tag.clone(),
            require_interaction: config.require_interaction,
            data: NotificationData {
                url,
                timestamp: epoch_millis(),
            },
        }
    }
}

// ==================== Push Capability ====================

/// Registration with the external push service.
///
/// Initialization is failure tolerant: a deployment without a valid
/// credential runs with the capability absent and drops push payloads.
#[derive(Debug, Clone)]
pub struct PushCapability {
    /// Sender identifier the deployment registered with.
    pub sender_id: String,
}

impl PushCapability {
    /// Register with the push service.
    pub fn register(config: &PushConfig) -> Result<Self, ServiceWorkerError> {
        if config.sender_id.trim().is_empty() {
            return Err(ServiceWorkerError::ConfigError(
                "push sender id is empty".to_string(),
            ));
        }
        debug!(sender_id = %config.sender_id, "push capability registered");
        Ok(Self {
            sender_id: config.sender_id.clone(),
        })
    }
}

// ==================== Notification Center ====================

/// Visible notifications, at most one per tag.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    shown: RwLock<HashMap<String, Notification>>,
}

impl NotificationCenter {
    /// Create an empty center.
    pub fn new() -> Self {
        Self::default()
    }

    /// Show a notification, replacing any visible one with the same tag.
    /// Returns true when an earlier notification was replaced.
    pub async fn show(&self, notification: Notification) -> bool {
        let mut shown = self.shown.write().await;
        shown
            .insert(notification.tag.clone(), notification)
            .is_some()
    }

    /// Close the notification with the given tag.
    pub async fn close(&self, tag: &str) -> Option<Notification> {
        self.shown.write().await.remove(tag)
    }

    /// Snapshot of visible notifications.
    pub async fn visible(&self) -> Vec<Notification> {
        self.shown.read().await.values().cloned().collect()
    }

    /// Number of visible notifications.
    pub async fn len(&self) -> usize {
        self.shown.read().await.len()
    }

    /// Whether nothing is visible.
    pub async fn is_empty(&self) -> bool {
        self.shown.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> NotificationConfig {
        NotificationConfig::default()
    }

    fn payload(title: Option<&str>, body: Option<&str>, url: Option<&str>) -> PushPayload {
        PushPayload {
            notification: Some(PushNotification {
                title: title.map(String::from),
                body: body.map(String::from),
            }),
            data: url.map(|u| PushData {
                url: Some(u.to_string()),
            }),
        }
    }

    #[test]
    fn test_from_payload_uses_payload_fields() {
        let notification = Notification::from_payload(
            &payload(Some("Hello"), Some("World"), Some("/inbox")),
            &config(),
        );

        assert_eq!(notification.title, "Hello");
        assert_eq!(notification.body, "World");
        assert_eq!(notification.data.url, "/inbox");
        assert!(notification.data.timestamp > 0);
    }

    #[test]
    fn test_from_payload_fills_defaults() {
        let notification = Notification::from_payload(&PushPayload::default(), &config());

        assert_eq!(notification.title, "Notification");
        assert_eq!(notification.body, "New message available");
        assert_eq!(notification.icon, "/icon-192.png");
        assert_eq!(notification.vibration, vec![200, 100, 200]);
        assert_eq!(notification.tag, "pwa-notification");
        assert_eq!(notification.data.url, "/");
        assert!(!notification.require_interaction);
    }

    #[test]
    fn test_payload_from_json() {
        let bytes = serde_json::to_vec(&json!({
            "notification": {"title": "Hi"},
            "data": {"url": "/news"}
        }))
        .unwrap();

        let payload = PushPayload::from_json(&bytes).unwrap();
        assert_eq!(payload.notification.unwrap().title.unwrap(), "Hi");
        assert_eq!(payload.data.unwrap().url.unwrap(), "/news");
    }

    #[test]
    fn test_payload_from_invalid_json() {
        let result = PushPayload::from_json(b"not json");
        assert!(matches!(
            result,
            Err(ServiceWorkerError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_push_capability_register() {
        let capability = PushCapability::register(&PushConfig {
            sender_id: "sender-1".to_string(),
        })
        .unwrap();
        assert_eq!(capability.sender_id, "sender-1");

        let result = PushCapability::register(&PushConfig {
            sender_id: "  ".to_string(),
        });
        assert!(matches!(result, Err(ServiceWorkerError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_center_dedup_by_tag() {
        let center = NotificationCenter::new();

        let first = Notification::from_payload(&payload(Some("First"), None, None), &config());
        let second = Notification::from_payload(&payload(Some("Second"), None, None), &config());

        assert!(!center.show(first).await);
        assert!(center.show(second).await);

        let visible = center.visible().await;
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].title, "Second");
    }

    #[tokio::test]
    async fn test_center_close() {
        let center = NotificationCenter::new();
        let notification = Notification::from_payload(&PushPayload::default(), &config());
        let tag = notification.tag.clone();

        center.show(notification).await;
        let closed = center.close(&tag).await;

        assert!(closed.is_some());
        assert!(center.is_empty().await);
        assert!(center.close(&tag).await.is_none());
    }
}
