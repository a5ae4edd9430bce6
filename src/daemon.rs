//! Daemon - the running gateway
//!
//! Wires the world server, the conversation pipeline, and the external
//! service clients together, and runs until interrupted.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc;

use crate::assets::AssetGenerator;
use crate::config::Config;
use crate::llm::OpenAiChat;
use crate::pipeline::{Orchestrator, PipelineServices};
use crate::protocol::{ServerMessage, object_type_from_path, placement_id};
use crate::server::{self, ServerState};
use crate::voice::{Player, Synthesizer, Transcriber};
use crate::world::{
    Broadcaster, ConnectionRegistry, PositionQuery, WorldStateCache, choose_position,
    random_rotation, random_scale,
};
use crate::{Error, Result};

/// What drives placements while the daemon runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonMode {
    /// Voice conversation drives object creation (the default)
    Conversation,
    /// A timer drops a configured asset into the world on an interval
    Ambient,
}

/// The Conjure daemon
pub struct Daemon {
    config: Config,
    mode: DaemonMode,
}

impl Daemon {
    /// Create a new daemon
    #[must_use]
    pub const fn new(config: Config, mode: DaemonMode) -> Self {
        Self { config, mode }
    }

    /// Run the daemon until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if the server address is invalid or a required service
    /// client cannot be constructed
    #[allow(clippy::future_not_send)]
    pub async fn run(self) -> Result<()> {
        let registry = Arc::new(ConnectionRegistry::new());
        let cache = Arc::new(WorldStateCache::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        let query = PositionQuery::new(broadcaster.clone());

        // Viewer-facing WebSocket server
        let addr: SocketAddr = format!("{}:{}", self.config.server.host, self.config.server.port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid server address: {e}")))?;
        let state = Arc::new(ServerState {
            registry: Arc::clone(&registry),
            cache: Arc::clone(&cache),
        });
        tokio::spawn(async move {
            if let Err(e) = server::serve(state, addr).await {
                tracing::error!(error = %e, "world server failed");
            }
        });

        // Shutdown on ctrl-c
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(()).await;
            }
        });

        match self.mode {
            DaemonMode::Ambient => {
                self.run_ambient(&registry, &broadcaster, &query, &cache, &mut shutdown_rx)
                    .await?;
            }
            DaemonMode::Conversation if self.config.voice.enabled => {
                self.run_conversation(broadcaster, query, cache, &mut shutdown_rx)
                    .await?;
            }
            DaemonMode::Conversation => {
                tracing::info!("voice disabled, serving world state only");
                shutdown_rx.recv().await;
            }
        }

        tracing::info!("daemon stopped");
        Ok(())
    }

    /// Run the voice conversation pipeline until shutdown
    #[allow(clippy::future_not_send)]
    async fn run_conversation(
        &self,
        broadcaster: Broadcaster,
        query: PositionQuery,
        cache: Arc<WorldStateCache>,
        shutdown_rx: &mut mpsc::Receiver<()>,
    ) -> Result<()> {
        let assets = AssetGenerator::new(
            self.config.assets.base_url.clone(),
            self.config.assets.output_dir.clone(),
            self.config.assets.seed,
        )?;
        match assets.health().await {
            Ok(true) => tracing::info!(url = %self.config.assets.base_url, "asset service healthy"),
            Ok(false) => {
                tracing::warn!(url = %self.config.assets.base_url, "asset service unhealthy, turns may abort");
            }
            Err(e) => {
                tracing::warn!(error = %e, "asset service unreachable, turns may abort");
            }
        }

        let playback = match Player::open() {
            Ok(player) => Some(player),
            Err(e) => {
                tracing::warn!(error = %e, "no playback device, replies will not be spoken");
                None
            }
        };

        let services = PipelineServices {
            transcriber: Arc::new(build_transcriber(&self.config)?),
            chat: Arc::new(build_chat(&self.config)?),
            synthesizer: build_synthesizer(&self.config)?,
            playback,
            assets,
            query,
            cache,
            broadcaster,
        };

        let mut orchestrator = Orchestrator::new(self.config.pipeline_config(), services);
        orchestrator.run(shutdown_rx).await
    }

    /// Timer-driven placement of a fixed asset, no conversation involved
    async fn run_ambient(
        &self,
        registry: &ConnectionRegistry,
        broadcaster: &Broadcaster,
        query: &PositionQuery,
        cache: &WorldStateCache,
        shutdown_rx: &mut mpsc::Receiver<()>,
    ) -> Result<()> {
        let interval = Duration::from_secs(self.config.world.ambient_interval_secs.max(1));
        let grace = Duration::from_millis(self.config.pipeline.position_grace_ms);
        let asset = self.config.world.ambient_asset.clone();
        let bounds = self.config.world.bounds();
        let mut rng = StdRng::from_entropy();

        tracing::info!(asset = %asset, interval_secs = interval.as_secs(), "ambient placement running");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                () = tokio::time::sleep(interval) => {
                    if registry.is_empty().await {
                        continue;
                    }

                    query.request().await?;
                    tokio::time::sleep(grace).await;

                    let existing = cache
                        .read()
                        .map(|snapshot| snapshot.planar_positions())
                        .unwrap_or_default();
                    let position = choose_position(
                        &mut rng,
                        &existing,
                        &bounds,
                        self.config.world.min_distance,
                        self.config.world.max_attempts,
                    );

                    let id = placement_id(&mut rng, object_type_from_path(&asset));
                    let message = ServerMessage::LoadObject {
                        id: id.clone(),
                        path: asset.clone(),
                        position,
                        rotation: random_rotation(&mut rng),
                        scale: random_scale(
                            &mut rng,
                            self.config.world.scale_min,
                            self.config.world.scale_max,
                        ),
                    };
                    let delivered = broadcaster.broadcast(&message).await?;
                    tracing::info!(%id, delivered, x = position.x, z = position.z, "ambient placement");
                }
            }
        }

        Ok(())
    }
}

/// Build the configured STT client
fn build_transcriber(config: &Config) -> Result<Transcriber> {
    match config.voice.stt_provider.as_str() {
        "deepgram" => Transcriber::deepgram(
            config.api_keys.deepgram.clone().unwrap_or_default(),
            config.voice.stt_model.clone(),
        ),
        "whisper" => Transcriber::whisper(
            config.api_keys.openai.clone().unwrap_or_default(),
            config.voice.stt_model.clone(),
        ),
        other => Err(Error::Config(format!("unknown STT provider: {other}"))),
    }
}

/// Build the configured TTS client
fn build_synthesizer(config: &Config) -> Result<Synthesizer> {
    match config.voice.tts_provider.as_str() {
        "elevenlabs" => Synthesizer::elevenlabs(
            config.api_keys.elevenlabs.clone().unwrap_or_default(),
            config.voice.tts_model.clone(),
            config.voice.tts_voice.clone(),
        ),
        "openai" => Synthesizer::openai(
            config.api_keys.openai.clone().unwrap_or_default(),
            config.voice.tts_model.clone(),
            config.voice.tts_voice.clone(),
            config.voice.tts_speed,
        ),
        other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
    }
}

/// Build the chat completion client
fn build_chat(config: &Config) -> Result<OpenAiChat> {
    OpenAiChat::new(
        config.api_keys.openai.clone().unwrap_or_default(),
        config.llm.model.clone(),
        config.llm.temperature,
    )
}
