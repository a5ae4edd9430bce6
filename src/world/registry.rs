//! Live viewer connection tracking

use std::collections::HashMap;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

/// Opaque handle for one registered viewer connection
pub type ConnectionId = Uuid;

/// Sending half of a viewer's outbound channel.
///
/// Frames are pre-serialized JSON; the receiving half is drained by the
/// writer task that owns the WebSocket sink. A closed receiver means the
/// socket is gone.
pub type ConnectionSender = mpsc::Sender<String>;

/// Tracks live viewer connections.
///
/// The registry is the sole owner of a connection for its lifetime: handlers
/// register on accept and unregister on close, and the broadcast dispatcher
/// prunes entries whose channel has failed.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, ConnectionSender>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new viewer connection, returning its handle
    pub async fn register(&self, sender: ConnectionSender) -> ConnectionId {
        let id = Uuid::new_v4();
        let mut connections = self.connections.write().await;
        connections.insert(id, sender);
        tracing::info!(connection = %id, total = connections.len(), "viewer connected");
        id
    }

    /// Remove a viewer connection. Removing an absent id is a no-op.
    pub async fn unregister(&self, id: ConnectionId) {
        let mut connections = self.connections.write().await;
        if connections.remove(&id).is_some() {
            tracing::info!(connection = %id, total = connections.len(), "viewer disconnected");
        }
    }

    /// Snapshot the current connection set for iteration.
    ///
    /// Returns a defensive copy so broadcast can iterate while connections
    /// register and unregister concurrently.
    pub async fn list(&self) -> Vec<(ConnectionId, ConnectionSender)> {
        self.connections
            .read()
            .await
            .iter()
            .map(|(id, sender)| (*id, sender.clone()))
            .collect()
    }

    /// Number of live connections
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Whether any viewer is connected
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_and_unregister() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        let id = registry.register(tx).await;
        assert_eq!(registry.len().await, 1);

        registry.unregister(id).await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn unregister_absent_is_noop() {
        let registry = ConnectionRegistry::new();
        registry.unregister(Uuid::new_v4()).await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn list_is_a_defensive_copy() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        let id = registry.register(tx).await;

        let listed = registry.list().await;
        registry.unregister(id).await;

        // The snapshot taken before unregistration is unaffected
        assert_eq!(listed.len(), 1);
        assert!(registry.is_empty().await);
    }
}
