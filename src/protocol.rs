//! Wire protocol between the gateway and world viewers
//!
//! All messages are JSON objects tagged by a kebab-case `type` field, with
//! camelCase member names to match what viewer clients expect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A point or per-axis value in world space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Create a new vector
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Distance to another point in the x-z (ground) plane
    #[must_use]
    pub fn planar_distance(&self, other_x: f64, other_z: f64) -> f64 {
        let dx = self.x - other_x;
        let dz = self.z - other_z;
        dx.hypot(dz)
    }
}

/// Messages sent from the gateway to viewers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Instruct viewers to load and place a newly generated asset.
    /// Immutable once broadcast; a placement is never revised.
    #[serde(rename_all = "camelCase")]
    LoadObject {
        id: String,
        path: String,
        position: Vec3,
        rotation: Vec3,
        scale: Vec3,
    },

    /// Ask viewers to report the positions of objects they can currently see
    #[serde(rename_all = "camelCase")]
    GetObjectPositions { request_id: Uuid, timestamp: i64 },
}

/// Messages sent from viewers to the gateway
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Reply to a `get-object-positions` request. The `request_id` echo is
    /// optional; replies are installed regardless of which request they
    /// answer.
    #[serde(rename_all = "camelCase")]
    ObjectPositions {
        objects: HashMap<String, ObjectReport>,
        #[serde(default)]
        request_id: Option<Uuid>,
    },
}

/// One object's state as reported by a viewer
///
/// Viewers may attach extra per-object fields; anything beyond the position
/// is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectReport {
    pub position: Vec3,
}

/// Timestamp of the most recently issued placement id, in unix milliseconds.
/// Bumped past the wall clock when ids are minted faster than once per
/// millisecond, keeping the time component strictly increasing.
static LAST_ID_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Mint a globally unique placement id.
///
/// The id combines the object-type tag, a strictly monotonic millisecond
/// timestamp, and a random four-digit disambiguator. Uniqueness is practical,
/// not cryptographic.
pub fn placement_id<R: Rng>(rng: &mut R, object_type: &str) -> String {
    let now = chrono::Utc::now().timestamp_millis();
    let prev = LAST_ID_MILLIS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(if now > last { now } else { last + 1 })
        })
        .unwrap_or(now);
    let stamped = if now > prev { now } else { prev + 1 };

    let disambiguator: u16 = rng.gen_range(1000..10000);
    format!("{object_type}_{stamped}_{disambiguator}")
}

/// Derive an object-type tag from an asset path ("models/tree.glb" → "tree")
#[must_use]
pub fn object_type_from_path(path: &str) -> &str {
    std::path::Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("object")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn load_object_serializes_with_kebab_tag() {
        let msg = ServerMessage::LoadObject {
            id: "tree_1_2".to_string(),
            path: "models/tree.glb".to_string(),
            position: Vec3::new(1.0, 0.0, 2.0),
            rotation: Vec3::default(),
            scale: Vec3::new(3.0, 3.0, 3.0),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"load-object\""));
        assert!(json.contains("\"path\":\"models/tree.glb\""));
    }

    #[test]
    fn position_request_uses_camel_case_fields() {
        let msg = ServerMessage::GetObjectPositions {
            request_id: Uuid::nil(),
            timestamp: 1700000000000,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"get-object-positions\""));
        assert!(json.contains("\"requestId\""));
        assert!(json.contains("\"timestamp\":1700000000000"));
    }

    #[test]
    fn object_positions_deserializes_and_ignores_extras() {
        let json = r#"{
            "type": "object-positions",
            "objects": {
                "tree_1": {"position": {"x": 2.0, "y": 0.0, "z": 2.0}, "visible": true}
            }
        }"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        let ClientMessage::ObjectPositions { objects, request_id } = msg;
        assert_eq!(objects.len(), 1);
        assert!(request_id.is_none());
        let report = &objects["tree_1"];
        assert!((report.position.x - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn placement_ids_are_pairwise_unique() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(placement_id(&mut rng, "tree")));
        }
    }

    #[test]
    fn object_type_comes_from_file_stem() {
        assert_eq!(object_type_from_path("models/tree.glb"), "tree");
        assert_eq!(object_type_from_path("rock.glb"), "rock");
        assert_eq!(object_type_from_path(""), "object");
    }

    #[test]
    fn planar_distance_ignores_height() {
        let p = Vec3::new(3.0, 10.0, 4.0);
        assert!((p.planar_distance(0.0, 0.0) - 5.0).abs() < 1e-9);
    }
}
