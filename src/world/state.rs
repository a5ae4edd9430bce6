//! Server-side cache of viewer-reported object positions

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::protocol::ObjectReport;

/// One complete viewer report of object positions.
///
/// Snapshots are immutable once built; the cache swaps them wholesale.
#[derive(Debug, Clone)]
pub struct WorldSnapshot {
    /// Object id → reported state
    pub objects: HashMap<String, ObjectReport>,

    /// Correlation id of the position request this report answers, when the
    /// viewer echoed one back
    pub request_id: Option<Uuid>,

    /// When the report arrived at the gateway
    pub received_at: DateTime<Utc>,
}

impl WorldSnapshot {
    /// Build a snapshot from a viewer report
    #[must_use]
    pub fn new(objects: HashMap<String, ObjectReport>, request_id: Option<Uuid>) -> Self {
        Self {
            objects,
            request_id,
            received_at: Utc::now(),
        }
    }

    /// Ground-plane `(x, z)` coordinates of every reported object
    #[must_use]
    pub fn planar_positions(&self) -> Vec<(f64, f64)> {
        self.objects
            .values()
            .map(|report| (report.position.x, report.position.z))
            .collect()
    }

    /// Number of reported objects
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the report contains no objects
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Holds the most recent complete snapshot, last-reporter-wins.
///
/// `install` replaces the stored snapshot atomically; readers never observe
/// a partial update. There is no history and no per-object merge across
/// reports.
#[derive(Debug, Default)]
pub struct WorldStateCache {
    snapshot: RwLock<Option<WorldSnapshot>>,
}

impl WorldStateCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored snapshot wholesale
    pub fn install(&self, snapshot: WorldSnapshot) {
        if let Ok(mut current) = self.snapshot.write() {
            tracing::debug!(objects = snapshot.len(), "world snapshot installed");
            *current = Some(snapshot);
        }
    }

    /// Read the current snapshot, or `None` if no report has ever arrived
    #[must_use]
    pub fn read(&self) -> Option<WorldSnapshot> {
        self.snapshot.read().ok().and_then(|guard| guard.clone())
    }
}
