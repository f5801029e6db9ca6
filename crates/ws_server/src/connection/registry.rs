//! Registry of open connections and the active-connection slot.

use super::{ClientConnection, ConnectionId};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Tracks every open connection plus the most recently active one.
///
/// The active slot is overwritten on every connection and message event, from
/// whichever connection task gets there first. Two clients talking at the same
/// time race for it; callers that need a specific recipient should reply
/// through the [`ClientConnection`] carried in the event context instead.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ClientConnection>,
    active: RwLock<Option<ClientConnection>>,
    next_id: AtomicUsize,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh connection ID.
    pub(crate) fn next_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn add(&self, connection: ClientConnection) {
        debug!("Tracking connection {} from {}", connection.id(), connection.peer());
        self.connections.insert(connection.id(), connection);
    }

    /// Stops tracking a connection, clearing the active slot if it pointed here.
    pub fn remove(&self, id: ConnectionId) -> Option<ClientConnection> {
        let removed = self.connections.remove(&id).map(|(_, conn)| conn);
        let mut active = self.active.write();
        if active.as_ref().is_some_and(|conn| conn.id() == id) {
            *active = None;
        }
        removed
    }

    /// Snapshot of all tracked connections, ordered by connection ID.
    pub fn list(&self) -> Vec<ClientConnection> {
        let mut snapshot: Vec<ClientConnection> = self
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        snapshot.sort_by_key(ClientConnection::id);
        snapshot
    }

    pub fn set_active(&self, connection: &ClientConnection) {
        *self.active.write() = Some(connection.clone());
    }

    pub fn get_active(&self) -> Option<ClientConnection> {
        self.active.read().clone()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Sends a close frame to every tracked connection and forgets them all.
    pub fn close_all(&self) -> usize {
        let snapshot = self.list();
        for connection in &snapshot {
            connection.close();
        }
        self.connections.clear();
        *self.active.write() = None;
        snapshot.len()
    }
}
