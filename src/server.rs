//! WebSocket server for world viewers
//!
//! Each viewer holds one socket. The gateway pushes `load-object` and
//! `get-object-positions` frames out and installs `object-positions` replies
//! into the world state cache. Malformed payloads are logged and dropped
//! without closing the connection.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::protocol::ClientMessage;
use crate::world::{ConnectionRegistry, WorldSnapshot, WorldStateCache};
use crate::{Error, Result};

/// Shared state for the viewer-facing server
pub struct ServerState {
    pub registry: Arc<ConnectionRegistry>,
    pub cache: Arc<WorldStateCache>,
}

/// Build the viewer-facing router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the task is dropped
///
/// # Errors
///
/// Returns error if the listener cannot bind
pub async fn serve(state: Arc<ServerState>, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "world server listening");
    axum::serve(listener, router(state))
        .await
        .map_err(|e| Error::Channel(e.to_string()))
}

/// Liveness probe
async fn health(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.registry.len().await,
    }))
}

/// Handle a WebSocket upgrade request
async fn ws_upgrade(
    State(state): State<Arc<ServerState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle one viewer connection for its lifetime
async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let (mut sink, mut stream) = socket.split();

    // Outbound frames flow through the registry; the writer task owns the sink
    let (tx, mut rx) = mpsc::channel::<String>(32);
    let id = state.registry.register(tx).await;

    let mut write_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let cache = Arc::clone(&state.cache);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            match message {
                Message::Text(text) => handle_viewer_message(&text, &cache),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut write_task => read_task.abort(),
        _ = &mut read_task => write_task.abort(),
    }

    state.registry.unregister(id).await;
}

/// Decode and apply one viewer message.
///
/// Undecodable payloads are logged and ignored; the connection stays open.
pub fn handle_viewer_message(text: &str, cache: &WorldStateCache) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::ObjectPositions { objects, request_id }) => {
            tracing::info!(objects = objects.len(), "object positions received");
            cache.install(WorldSnapshot::new(objects, request_id));
        }
        Err(e) => {
            tracing::warn!(error = %e, "dropping malformed viewer message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_report_installs_a_snapshot() {
        let cache = WorldStateCache::new();
        let json = r#"{
            "type": "object-positions",
            "objects": {"tree_1": {"position": {"x": 2.0, "y": 0.0, "z": 2.0}}}
        }"#;
        handle_viewer_message(json, &cache);

        let snapshot = cache.read().expect("snapshot installed");
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn malformed_payload_is_dropped() {
        let cache = WorldStateCache::new();
        handle_viewer_message("not json at all", &cache);
        handle_viewer_message(r#"{"type":"object-positions"}"#, &cache);
        assert!(cache.read().is_none());
    }

    #[test]
    fn unknown_message_type_is_dropped() {
        let cache = WorldStateCache::new();
        handle_viewer_message(r#"{"type":"teleport","x":1}"#, &cache);
        assert!(cache.read().is_none());
    }

    #[tokio::test]
    async fn health_reports_connection_count() {
        use tower::ServiceExt;

        let state = Arc::new(ServerState {
            registry: Arc::new(ConnectionRegistry::new()),
            cache: Arc::new(WorldStateCache::new()),
        });
        let app = router(state);

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/health")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connections"], 0);
    }
}
