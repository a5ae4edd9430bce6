//! World-synchronization protocol tests

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc;

use conjure_gateway::protocol::placement_id;
use conjure_gateway::server::handle_viewer_message;
use conjure_gateway::world::PositionQuery;
use conjure_gateway::{
    Bounds, Broadcaster, ConnectionRegistry, ServerMessage, Vec3, WorldStateCache, choose_position,
};

/// A viewer reports an object at (2, 0, 2); subsequent placements with a
/// 3-unit minimum distance must clear it.
#[tokio::test]
async fn reported_positions_steer_placement() {
    let registry = Arc::new(ConnectionRegistry::new());
    let cache = Arc::new(WorldStateCache::new());
    let broadcaster = Broadcaster::new(Arc::clone(&registry));
    let query = PositionQuery::new(broadcaster.clone());

    // Viewer connects
    let (tx, mut viewer_rx) = mpsc::channel(8);
    registry.register(tx).await;

    // Server requests positions
    query.request().await.unwrap();
    let frame = viewer_rx.recv().await.unwrap();
    let request: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(request["type"], "get-object-positions");

    // Viewer replies with one object at (2, 0, 2)
    let reply = r#"{
        "type": "object-positions",
        "objects": {"rock_1": {"position": {"x": 2.0, "y": 0.0, "z": 2.0}}}
    }"#;
    handle_viewer_message(reply, &cache);

    let snapshot = cache.read().expect("snapshot installed");
    let existing = snapshot.planar_positions();
    assert_eq!(existing, vec![(2.0, 2.0)]);

    // Every subsequent placement clears the reported object
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..25 {
        let position = choose_position(&mut rng, &existing, &Bounds::default(), 3.0, 10);
        assert!(
            position.planar_distance(2.0, 2.0) >= 3.0,
            "placement {position:?} within 3 units of the reported object"
        );
    }
}

#[tokio::test]
async fn broadcast_survives_a_closed_viewer() {
    let registry = Arc::new(ConnectionRegistry::new());
    let broadcaster = Broadcaster::new(Arc::clone(&registry));

    let (tx_open, mut rx_open) = mpsc::channel(8);
    let (tx_closed, rx_closed) = mpsc::channel(8);
    registry.register(tx_open).await;
    registry.register(tx_closed).await;
    drop(rx_closed);

    let message = ServerMessage::LoadObject {
        id: "tree_1700000000000_1234".to_string(),
        path: "models/tree.glb".to_string(),
        position: Vec3::new(1.0, 0.0, -4.0),
        rotation: Vec3::default(),
        scale: Vec3::new(3.0, 3.0, 3.0),
    };
    let delivered = broadcaster.broadcast(&message).await.unwrap();

    // Delivered to the live viewer, and exactly the dead one was pruned
    assert_eq!(delivered, 1);
    assert_eq!(registry.len().await, 1);

    let frame = rx_open.recv().await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(value["type"], "load-object");
    assert_eq!(value["path"], "models/tree.glb");
    assert_eq!(value["position"]["y"], 0.0);
}

#[test]
fn snapshot_replacement_is_wholesale() {
    let cache = WorldStateCache::new();

    handle_viewer_message(
        r#"{"type":"object-positions","objects":{
            "a": {"position":{"x":1.0,"y":0.0,"z":1.0}},
            "b": {"position":{"x":2.0,"y":0.0,"z":2.0}}
        }}"#,
        &cache,
    );
    handle_viewer_message(
        r#"{"type":"object-positions","objects":{
            "c": {"position":{"x":3.0,"y":0.0,"z":3.0}}
        }}"#,
        &cache,
    );

    let snapshot = cache.read().expect("snapshot installed");
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot.objects.contains_key("c"));
    assert!(!snapshot.objects.contains_key("a"));
    assert!(!snapshot.objects.contains_key("b"));
}

#[test]
fn malformed_reports_leave_the_cache_untouched() {
    let cache = WorldStateCache::new();

    handle_viewer_message("garbage", &cache);
    assert!(cache.read().is_none());

    handle_viewer_message(
        r#"{"type":"object-positions","objects":{"a":{"position":{"x":1.0,"y":0.0,"z":1.0}}}}"#,
        &cache,
    );
    handle_viewer_message(r#"{"type":"object-positions","objects":"nope"}"#, &cache);

    // The bad report did not clobber the good snapshot
    let snapshot = cache.read().expect("snapshot intact");
    assert_eq!(snapshot.len(), 1);
}

#[test]
fn a_thousand_placement_ids_never_collide() {
    let mut rng = StdRng::seed_from_u64(2);
    let mut seen = std::collections::HashSet::new();
    for i in 0..1000 {
        let object_type = if i % 2 == 0 { "tree" } else { "rock" };
        let id = placement_id(&mut rng, object_type);
        assert!(seen.insert(id.clone()), "duplicate id: {id}");
    }
}

#[test]
fn empty_world_placements_are_independent_uniform_draws() {
    let bounds = Bounds::default();
    let mut rng = StdRng::seed_from_u64(17);

    let first = choose_position(&mut rng, &[], &bounds, 3.0, 10);
    let second = choose_position(&mut rng, &[], &bounds, 3.0, 10);

    for position in [first, second] {
        assert!(bounds.contains(&position));
        assert!((position.y - bounds.ground_y).abs() < f64::EPSILON);
    }
    assert!(first.x != second.x || first.z != second.z);
}
