//! End-to-end turn tests against a stub asset service

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::routing::{get, post};
use tokio::sync::mpsc;

use conjure_gateway::assets::AssetGenerator;
use conjure_gateway::voice::{Synthesizer, Transcriber};
use conjure_gateway::world::PositionQuery;
use conjure_gateway::{
    Broadcaster, ChatModel, ConnectionRegistry, ConversationTurn, Orchestrator, PipelineConfig,
    PipelineServices, Result, TurnOutcome, WorldStateCache,
};

/// Chat model that always answers with the same reply
struct ScriptedModel(&'static str);

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, _turns: &[ConversationTurn]) -> Result<String> {
        Ok(self.0.to_string())
    }
}

/// Serve a minimal Trellis-style asset API on an ephemeral port
async fn spawn_asset_stub() -> String {
    let app = Router::new()
        .route("/generate/text", post(|| async { vec![0x67u8, 0x6c, 0x62, 0x00] }))
        .route("/health", get(|| async { "ok" }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

fn turn_config() -> PipelineConfig {
    PipelineConfig {
        turn_pause: Duration::from_millis(0),
        position_grace: Duration::from_millis(50),
        service_timeout: Duration::from_secs(5),
        ..PipelineConfig::default()
    }
}

#[tokio::test]
async fn a_described_object_is_generated_and_placed() {
    let asset_url = spawn_asset_stub().await;
    let asset_dir = tempfile::tempdir().unwrap();

    let registry = Arc::new(ConnectionRegistry::new());
    let cache = Arc::new(WorldStateCache::new());
    let broadcaster = Broadcaster::new(Arc::clone(&registry));

    // Viewer that answers every position request with one object at (2, 0, 2)
    let (tx, mut viewer_rx) = mpsc::channel::<String>(16);
    registry.register(tx).await;
    let responder_cache = Arc::clone(&cache);
    let (frames_tx, mut frames_rx) = mpsc::channel::<String>(16);
    tokio::spawn(async move {
        while let Some(frame) = viewer_rx.recv().await {
            let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
            if value["type"] == "get-object-positions" {
                let reply = r#"{
                    "type": "object-positions",
                    "objects": {"rock_1": {"position": {"x": 2.0, "y": 0.0, "z": 2.0}}}
                }"#;
                conjure_gateway::server::handle_viewer_message(reply, &responder_cache);
            }
            let _ = frames_tx.send(frame).await;
        }
    });

    let services = PipelineServices {
        transcriber: Arc::new(
            Transcriber::whisper("test-key".to_string(), "whisper-1".to_string()).unwrap(),
        ),
        chat: Arc::new(ScriptedModel("Let's create a glowing blue mushroom.")),
        synthesizer: Synthesizer::openai(
            "test-key".to_string(),
            "tts-1".to_string(),
            "alloy".to_string(),
            1.0,
        )
        .unwrap(),
        playback: None,
        assets: AssetGenerator::new(asset_url, asset_dir.path(), 1).unwrap(),
        query: PositionQuery::new(broadcaster.clone()),
        cache,
        broadcaster,
    };

    let mut orchestrator = Orchestrator::new(turn_config(), services);
    let outcome = orchestrator
        .process_transcript("I want a mushroom".to_string())
        .await
        .unwrap();

    let TurnOutcome::Placed { id } = outcome else {
        panic!("expected a placement, got {outcome:?}");
    };
    assert!(id.starts_with("a_glowing_blue_mushroom"));

    // The viewer saw the position request first, then the placement
    let first = frames_rx.recv().await.unwrap();
    let first: serde_json::Value = serde_json::from_str(&first).unwrap();
    assert_eq!(first["type"], "get-object-positions");

    let second = frames_rx.recv().await.unwrap();
    let second: serde_json::Value = serde_json::from_str(&second).unwrap();
    assert_eq!(second["type"], "load-object");
    assert_eq!(second["id"], id);

    // Placement respects the reported object and the configured ranges
    let x = second["position"]["x"].as_f64().unwrap();
    let y = second["position"]["y"].as_f64().unwrap();
    let z = second["position"]["z"].as_f64().unwrap();
    assert!((-10.0..=10.0).contains(&x));
    assert!((-10.0..=10.0).contains(&z));
    assert!(y.abs() < f64::EPSILON);
    assert!((x - 2.0).hypot(z - 2.0) >= 3.0);

    for axis in ["x", "y", "z"] {
        let scale = second["scale"][axis].as_f64().unwrap();
        assert!((2.5..7.5).contains(&scale));
    }

    // The generated model landed in the output directory
    let saved: Vec<_> = std::fs::read_dir(asset_dir.path()).unwrap().collect();
    assert_eq!(saved.len(), 1);

    // Both turns are in the history, in order
    let history = orchestrator.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "I want a mushroom");
    assert!(history[1].content.starts_with("Let's create"));
}

#[tokio::test]
async fn placement_proceeds_with_no_viewers_and_no_snapshot() {
    let asset_url = spawn_asset_stub().await;
    let asset_dir = tempfile::tempdir().unwrap();

    let registry = Arc::new(ConnectionRegistry::new());
    let cache = Arc::new(WorldStateCache::new());
    let broadcaster = Broadcaster::new(Arc::clone(&registry));

    let services = PipelineServices {
        transcriber: Arc::new(
            Transcriber::whisper("test-key".to_string(), "whisper-1".to_string()).unwrap(),
        ),
        chat: Arc::new(ScriptedModel("Let's create a paper lantern.")),
        synthesizer: Synthesizer::openai(
            "test-key".to_string(),
            "tts-1".to_string(),
            "alloy".to_string(),
            1.0,
        )
        .unwrap(),
        playback: None,
        assets: AssetGenerator::new(asset_url, asset_dir.path(), 1).unwrap(),
        query: PositionQuery::new(broadcaster.clone()),
        cache,
        broadcaster,
    };

    // No viewers at all: the grace period elapses with zero replies and the
    // placement still completes
    let mut orchestrator = Orchestrator::new(turn_config(), services);
    let outcome = orchestrator
        .process_transcript("a lantern please".to_string())
        .await
        .unwrap();

    assert!(matches!(outcome, TurnOutcome::Placed { .. }));
}
