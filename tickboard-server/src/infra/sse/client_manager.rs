use std::{fmt, sync::Arc};

use dashmap::DashMap;
use tickboard_model::OutboundMessage;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use super::client::Client;

/// Live set of push clients.
///
/// Removal is reached from two directions: the broadcaster after a failed
/// write and the response stream when the socket goes away. Both call
/// [`ClientManager::remove_client`], which tolerates repeats.
#[derive(Clone, Default)]
pub struct ClientManager {
    clients: Arc<DashMap<Uuid, Arc<Client>>>,
}

impl fmt::Debug for ClientManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientManager")
            .field("client_count", &self.clients.len())
            .finish()
    }
}

impl ClientManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing client handle.
    pub fn add_client(&self, client: Arc<Client>) {
        info!(client_id = %client.id, "push client connected");
        self.clients.insert(client.id, client);
    }

    /// Create a client with an outbound buffer of `buffer` messages and
    /// register it. The receiver feeds the client's response stream.
    pub fn register(
        &self,
        buffer: usize,
    ) -> (Arc<Client>, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let client = Arc::new(Client::new(tx));
        self.add_client(Arc::clone(&client));
        (client, rx)
    }

    /// Returns whether the client was still registered.
    pub fn remove_client(&self, id: Uuid) -> bool {
        let removed = self.clients.remove(&id).is_some();
        if removed {
            info!(client_id = %id, remaining = self.clients.len(), "push client removed");
        } else {
            debug!(client_id = %id, "push client already removed");
        }
        removed
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Point-in-time copy of the live clients; safe to iterate while other
    /// tasks add or remove clients.
    pub fn clients(&self) -> Vec<Arc<Client>> {
        self.clients
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Drop every client. Their response streams end once buffered
    /// messages are drained.
    pub fn disconnect_all(&self) -> usize {
        let count = self.clients.len();
        self.clients.clear();
        count
    }
}

/// Removes a client when its response stream is dropped.
pub struct ClientGuard {
    clients: ClientManager,
    id: Uuid,
}

impl ClientGuard {
    pub fn new(clients: ClientManager, id: Uuid) -> Self {
        Self { clients, id }
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.clients.remove_client(self.id);
    }
}

impl fmt::Debug for ClientGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientGuard").field("id", &self.id).finish()
    }
}
