//! Position query protocol
//!
//! Fire-and-forget request/response used to refresh the world state cache.
//! Requests are broadcast to every viewer; whichever replies arrive are
//! installed into the cache by the connection handler, regardless of which
//! request they logically answer. Callers that need a snapshot before
//! proceeding sleep a bounded grace period and then read whatever is cached.

use uuid::Uuid;

use crate::Result;
use crate::protocol::ServerMessage;
use crate::world::broadcast::Broadcaster;

/// Issues `get-object-positions` requests to all viewers
#[derive(Clone)]
pub struct PositionQuery {
    broadcaster: Broadcaster,
}

impl PositionQuery {
    /// Create a query protocol over the given dispatcher
    #[must_use]
    pub fn new(broadcaster: Broadcaster) -> Self {
        Self { broadcaster }
    }

    /// Broadcast a position request carrying a fresh correlation id.
    ///
    /// Does not wait for any reply. Returns the correlation id for logging.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails to serialize.
    pub async fn request(&self) -> Result<Uuid> {
        let request_id = Uuid::new_v4();
        let message = ServerMessage::GetObjectPositions {
            request_id,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };

        let delivered = self.broadcaster.broadcast(&message).await?;
        tracing::debug!(%request_id, delivered, "position request broadcast");
        Ok(request_id)
    }
}
