//! Best-effort fan-out of messages to every connected viewer

use std::sync::Arc;

use crate::Result;
use crate::protocol::ServerMessage;
use crate::world::registry::ConnectionRegistry;

/// Fans messages out to every registered viewer connection.
///
/// Delivery is best-effort: a connection whose channel has closed is
/// unregistered and the broadcast continues to the rest. Nothing is queued
/// or retried.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    /// Create a dispatcher over the given registry
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Serialize `message` once and deliver it to every live connection.
    ///
    /// Returns the number of connections the frame was handed to.
    ///
    /// # Errors
    ///
    /// Returns an error only if the message fails to serialize; per-connection
    /// send failures prune the connection and are not errors.
    pub async fn broadcast(&self, message: &ServerMessage) -> Result<usize> {
        let frame = serde_json::to_string(message)?;

        let mut delivered = 0;
        for (id, sender) in self.registry.list().await {
            if sender.send(frame.clone()).await.is_ok() {
                delivered += 1;
            } else {
                tracing::debug!(connection = %id, "channel closed, pruning connection");
                self.registry.unregister(id).await;
            }
        }

        Ok(delivered)
    }
}
