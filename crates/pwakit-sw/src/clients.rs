//! Controlled pages and message delivery.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

use crate::messages::OutboundMessage;
use crate::ServiceWorkerError;

/// Unique identifier for a connected page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A page connected to the scope.
#[derive(Debug)]
pub struct Client {
    /// Client ID.
    pub id: ClientId,

    /// Page URL.
    pub url: Url,

    /// Whether the page currently has focus.
    pub focused: bool,

    /// Whether this worker controls the page.
    pub controlled: bool,

    /// Delivery channel to the page.
    sender: mpsc::UnboundedSender<OutboundMessage>,
}

impl Client {
    /// Send a message to the page. Returns false when the page side of the
    /// channel is gone.
    pub fn post_message(&self, message: OutboundMessage) -> bool {
        self.sender.send(message).is_ok()
    }
}

/// Registry of pages visible to the worker.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<ClientId, Client>,
}

impl Clients {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open page, returning its id and message receiver.
    pub fn connect(&mut self, url: Url) -> (ClientId, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = ClientId::new();
        self.clients.insert(
            id,
            Client {
                id,
                url,
                focused: false,
                controlled: false,
                sender,
            },
        );
        (id, receiver)
    }

    /// Get a client by id.
    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    /// All clients, optionally restricted to controlled ones.
    pub fn match_all(&self, include_uncontrolled: bool) -> Vec<&Client> {
        self.clients
            .values()
            .filter(|c| include_uncontrolled || c.controlled)
            .collect()
    }

    /// First client whose URL matches.
    pub fn find_by_url(&self, url: &Url) -> Option<ClientId> {
        self.clients
            .values()
            .find(|c| c.url == *url)
            .map(|c| c.id)
    }

    /// Take control of every open page immediately. Returns how many pages
    /// changed controller.
    pub fn claim(&mut self) -> usize {
        let mut claimed = 0;
        for client in self.clients.values_mut() {
            if !client.controlled {
                client.controlled = true;
                claimed += 1;
            }
        }
        claimed
    }

    /// Broadcast a message to every controlled page. Returns how many pages
    /// received it.
    pub fn broadcast(&self, message: &OutboundMessage) -> usize {
        let mut delivered = 0;
        for client in self.clients.values().filter(|c| c.controlled) {
            if client.post_message(message.clone()) {
                delivered += 1;
            } else {
                debug!(id = ?client.id, "client channel closed, message dropped");
            }
        }
        delivered
    }

    /// Focus a page. Only one page holds focus at a time.
    pub fn focus(&mut self, id: ClientId) -> Result<(), ServiceWorkerError> {
        if !self.clients.contains_key(&id) {
            return Err(ServiceWorkerError::StateError(format!(
                "no client {:?}",
                id
            )));
        }
        for client in self.clients.values_mut() {
            client.focused = client.id == id;
        }
        Ok(())
    }

    /// Open a new page at a URL, controlled and focused.
    ///
    /// The returned receiver carries future worker messages; a host that
    /// drops it simply stops listening.
    pub fn open_window(
        &mut self,
        url: Url,
    ) -> (ClientId, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (id, receiver) = self.connect(url);
        if let Some(client) = self.clients.get_mut(&id) {
            client.controlled = true;
        }
        for client in self.clients.values_mut() {
            client.focused = client.id == id;
        }
        (id, receiver)
    }

    /// Drop a page from the registry.
    pub fn disconnect(&mut self, id: ClientId) -> bool {
        self.clients.remove(&id).is_some()
    }

    /// Number of connected pages.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no pages are connected.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
