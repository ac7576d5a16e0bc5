//! Set of live connections.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use relay_core::ConnectionId;

use super::connection::ClientConnection;

/// Connections currently believed live, keyed by ID.
///
/// Membership is only a belief: a member may already have failed before its
/// removal is observed. Removing never closes a connection; closing is up to
/// whoever detected the failure.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection.
    ///
    /// Returns `false` (and keeps the existing member) if a connection with
    /// the same ID is already registered.
    pub fn add(&self, connection: Arc<ClientConnection>) -> bool {
        let mut conns = self.connections.write();
        if conns.contains_key(connection.id()) {
            return false;
        }
        let _ = conns.insert(connection.id().clone(), connection);
        true
    }

    /// Remove a connection by ID. Removing an absent ID is a no-op.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.write().remove(id)
    }

    /// Copy of the current membership.
    pub fn snapshot(&self) -> Vec<Arc<ClientConnection>> {
        self.connections.read().values().cloned().collect()
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.read().contains_key(id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Remove every member, returning each exactly once.
    pub fn drain(&self) -> Vec<Arc<ClientConnection>> {
        self.connections.write().drain().map(|(_, c)| c).collect()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("len", &self.len())
            .finish()
    }
}
