//! Control channel wire types.
//!
//! Pages talk to the worker with small tagged JSON messages; the worker
//! broadcasts tagged JSON back. Shapes here are wire-exact.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Commands pages send to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PageCommand {
    /// Force promotion of a pending generation.
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
    /// Ask whether the worker is active and ready.
    #[serde(rename = "CHECK_STATUS")]
    CheckStatus,
}

/// Reply to a status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub active: bool,
    pub ready: bool,
}

/// Messages broadcast from the worker to pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    /// Sent after activation when announcements are enabled.
    #[serde(rename = "SW_ACTIVATED")]
    Activated {
        /// Human-readable status line for the page.
        message: String,
    },
}

/// A message event from a controlled page.
#[derive(Debug)]
pub struct MessageEvent {
    /// Raw message payload.
    pub data: serde_json::Value,

    /// Reply port for commands that answer synchronously.
    pub reply: Option<oneshot::Sender<StatusReply>>,
}

impl MessageEvent {
    /// Event without a reply port.
    pub fn new(data: serde_json::Value) -> Self {
        Self { data, reply: None }
    }

    /// Event carrying a reply port.
    pub fn with_reply(data: serde_json::Value, reply: oneshot::Sender<StatusReply>) -> Self {
        Self {
            data,
            reply: Some(reply),
        }
    }

    /// Parse the payload as a command. Unknown shapes yield `None`.
    pub fn command(&self) -> Option<PageCommand> {
        serde_json::from_value(self.data.clone()).ok()
    }
}
