//! Connected streaming clients.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use mediot_common::ServerEvent;

/// Identifier of a connected streaming client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    /// Allocate a process-unique identifier.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Outbound queues of every connected client.
///
/// A client whose queue is closed is dropped on the next send.
#[derive(Debug, Default)]
pub struct ClientHub {
    clients: HashMap<ClientId, mpsc::UnboundedSender<ServerEvent>>,
}

impl ClientHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: ClientId, sender: mpsc::UnboundedSender<ServerEvent>) {
        self.clients.insert(id, sender);
    }

    pub fn remove(&mut self, id: ClientId) -> bool {
        self.clients.remove(&id).is_some()
    }

    /// Send to one client. Returns whether the event was queued.
    pub fn send_to(&mut self, id: ClientId, event: ServerEvent) -> bool {
        let Some(sender) = self.clients.get(&id) else {
            tracing::debug!(client = %id, "Unknown client, dropping event");
            return false;
        };
        if sender.send(event).is_err() {
            self.clients.remove(&id);
            tracing::debug!(client = %id, "Client queue closed, removed");
            return false;
        }
        true
    }

    /// Send to every client. Returns how many received the event.
    pub fn broadcast(&mut self, event: &ServerEvent) -> usize {
        let before = self.clients.len();
        self.clients
            .retain(|_, sender| sender.send(event.clone()).is_ok());

        let removed = before - self.clients.len();
        if removed > 0 {
            tracing::debug!(removed, "Dropped closed client queues");
        }
        self.clients.len()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
