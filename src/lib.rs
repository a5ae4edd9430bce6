//! Conjure Gateway - voice-driven object conjuring for shared 3D worlds
//!
//! A speaker talks; their speech is transcribed, a language model turns the
//! conversation into an object description, a synthesized reply is played
//! back, an external service renders the description into a 3D asset, and
//! the asset's placement is broadcast to every connected viewer. Viewers
//! report object positions back so new placements avoid collisions.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                    Speaker (mic/speaker)               │
//! └──────────────────────────┬────────────────────────────┘
//!                            │
//! ┌──────────────────────────▼────────────────────────────┐
//! │                 Conversation Pipeline                  │
//! │   capture → STT → LLM → TTS → asset gen → placement   │
//! └──────────────────────────┬────────────────────────────┘
//!                            │
//! ┌──────────────────────────▼────────────────────────────┐
//! │                 World Synchronization                  │
//! │   registry │ broadcast │ state cache │ placement      │
//! └──────────────────────────┬────────────────────────────┘
//!                            │ WebSocket (JSON)
//!                  viewers (3D world clients)
//! ```

pub mod assets;
pub mod config;
pub mod daemon;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod protocol;
pub mod server;
pub mod voice;
pub mod world;

pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use llm::{ChatModel, ConversationTurn, Role};
pub use pipeline::{Orchestrator, PipelineConfig, PipelineServices, TurnOutcome, TurnPhase};
pub use protocol::{ClientMessage, ObjectReport, ServerMessage, Vec3};
pub use world::{
    Bounds, Broadcaster, ConnectionRegistry, PositionQuery, WorldSnapshot, WorldStateCache,
    choose_position,
};
