//! Worker events and the background task guard.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::warn;

use crate::fetch::{FetchOutcome, FetchRequest};
use crate::messages::MessageEvent;
use crate::notifications::{Notification, PushPayload};

// ==================== Events ====================

/// An event delivered to the worker scope.
#[derive(Debug)]
pub enum WorkerEvent {
    /// First event of a new worker version.
    Install,

    /// Promotion of an installed worker.
    Activate,

    /// An intercepted resource request.
    Fetch(FetchRequest),

    /// A message from a controlled page.
    Message(MessageEvent),

    /// A push payload from the push service.
    Push(PushPayload),

    /// A click on a displayed notification.
    NotificationClick(NotificationClick),
}

/// A click on a displayed notification.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationClick {
    /// Tag of the clicked notification.
    pub tag: String,

    /// Deep-link target carried by the notification.
    pub url: String,
}

impl NotificationClick {
    pub fn from_notification(notification: &Notification) -> Self {
        Self {
            tag: notification.tag.clone(),
            url: notification.data.url.clone(),
        }
    }
}

/// What handling an event produced.
#[derive(Debug)]
pub enum EventOutcome {
    /// The event ran to completion with nothing to hand back.
    Completed,

    /// The fetch decision for an intercepted request.
    Fetch(FetchOutcome),
}

impl EventOutcome {
    /// Extract the fetch decision, if any.
    pub fn fetch(self) -> Option<FetchOutcome> {
        match self {
            EventOutcome::Fetch(outcome) => Some(outcome),
            EventOutcome::Completed => None,
        }
    }
}

// ==================== Task Guard ====================

/// Keeps the worker alive until registered background work settles.
///
/// Handlers register follow-up work here instead of detaching it, and the
/// embedder awaits [`TaskGuard::settle`] before tearing the worker down.
/// Registered tasks must not register further work on the same guard.
#[derive(Debug, Clone, Default)]
pub struct TaskGuard {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl TaskGuard {
    /// Create an empty guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a background task.
    pub async fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.lock().await.spawn(future);
    }

    /// Number of tasks not yet settled.
    pub async fn pending(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Wait for every registered task to finish.
    pub async fn settle(&self) {
        let mut tasks = self.tasks.lock().await;
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "background task failed");
            }
        }
    }
}
