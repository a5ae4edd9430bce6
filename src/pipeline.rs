//! Conversation pipeline orchestration
//!
//! The turn-taking loop at the heart of the gateway. Each turn runs
//! `Idle → CaptureStarted → Transcribed → Responded → Synthesized →
//! AssetRequested → Placed → Idle`: capture an utterance, complete the
//! conversation, speak the reply, render the described object, and broadcast
//! its placement to every viewer. Exactly one turn runs at a time, and every
//! failure is turn-scoped: the job is discarded, capture restarts, and the
//! loop returns to idle.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::assets::{AssetGenerator, asset_wire_path};
use crate::llm::{ChatModel, ConversationTurn};
use crate::protocol::{ServerMessage, object_type_from_path, placement_id};
use crate::voice::{CaptureSession, Player, Synthesizer, Transcriber};
use crate::world::{
    Bounds, Broadcaster, PositionQuery, WorldStateCache, choose_position, random_rotation,
    random_scale,
};
use crate::{Error, Result};

/// Lead-in phrase the assistant uses to introduce an object description
const OBJECT_LEAD_IN: &str = "let's create";

/// Default system prompt seeding the conversation
pub const DEFAULT_SYSTEM_PROMPT: &str = "The user is walking around in a blank 3d \
virtual world. You are a helpful assistant that creates 3D objects in the world by \
synthesizing text prompts for a model-generation API. Respond to the user's ideas \
and help them add objects to the world. When it's time to give the API prompt, say, \
'Let's create a <description of the object>.' Keep the description brief but vivid, \
and describe a standalone object that can be dropped into a 3d world without its \
surroundings. If the user's idea was short, add a few fun details. Don't say \
anything before 'let's create'. Only if the user hasn't described an object yet, \
ask a short follow-up question instead.";

/// Default spoken greeting
pub const DEFAULT_GREETING: &str = "Hello! What do you want to explore today?";

/// Phases of the turn state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    CaptureStarted,
    Transcribed,
    Responded,
    Synthesized,
    AssetRequested,
    Placed,
}

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// An object was generated and its placement broadcast
    Placed { id: String },
    /// The reply carried no object description; nothing was placed
    FollowUp,
    /// An external service failed; the turn's job was discarded
    Aborted,
}

/// Pipeline tuning knobs
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// System prompt seeding the conversation history
    pub system_prompt: String,
    /// Greeting spoken when the pipeline starts
    pub greeting: String,
    /// Pause after a turn before the microphone reopens
    pub turn_pause: Duration,
    /// Bounded wait for position replies before reading the cache
    pub position_grace: Duration,
    /// Per-external-call timeout; an elapsed timer aborts the turn
    pub service_timeout: Duration,
    /// Ground-plane bounds placements are sampled from
    pub bounds: Bounds,
    /// Minimum x-z distance to any reported object
    pub min_distance: f64,
    /// Rejection-sampling attempts before best-effort placement
    pub max_attempts: u32,
    /// Per-axis scale range for placed objects
    pub scale_min: f64,
    pub scale_max: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            greeting: DEFAULT_GREETING.to_string(),
            turn_pause: Duration::from_secs(2),
            position_grace: Duration::from_secs(1),
            service_timeout: Duration::from_secs(60),
            bounds: Bounds::default(),
            min_distance: 3.0,
            max_attempts: 10,
            scale_min: 2.5,
            scale_max: 7.5,
        }
    }
}

/// External collaborators and world components the pipeline drives
pub struct PipelineServices {
    pub transcriber: Arc<Transcriber>,
    pub chat: Arc<dyn ChatModel>,
    pub synthesizer: Synthesizer,
    /// `None` disables playback (headless hosts); synthesis is skipped too
    pub playback: Option<Player>,
    pub assets: AssetGenerator,
    pub query: PositionQuery,
    pub cache: Arc<WorldStateCache>,
    pub broadcaster: Broadcaster,
}

/// The turn-taking orchestrator. One instance, single active run.
pub struct Orchestrator {
    config: PipelineConfig,
    services: PipelineServices,
    /// Ordered, append-only conversation context
    history: Vec<ConversationTurn>,
    session: Option<CaptureSession>,
    phase: TurnPhase,
    rng: StdRng,
}

impl Orchestrator {
    /// Create an idle orchestrator
    #[must_use]
    pub fn new(config: PipelineConfig, services: PipelineServices) -> Self {
        Self {
            config,
            services,
            history: Vec::new(),
            session: None,
            phase: TurnPhase::Idle,
            rng: StdRng::from_entropy(),
        }
    }

    /// Current phase of the turn state machine
    #[must_use]
    pub const fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// The conversation so far
    #[must_use]
    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    /// Run turns until shutdown is requested
    ///
    /// # Errors
    ///
    /// Returns error only on failures that prevent any further turn, such as
    /// the capture worker refusing to start. External-service failures are
    /// turn-scoped and do not surface here.
    pub async fn run(&mut self, shutdown: &mut mpsc::Receiver<()>) -> Result<()> {
        self.history
            .push(ConversationTurn::system(self.config.system_prompt.clone()));

        let greeting = self.config.greeting.clone();
        self.history.push(ConversationTurn::assistant(greeting.clone()));
        if let Err(e) = self.speak(&greeting).await {
            tracing::warn!(error = %e, "greeting playback failed");
        }

        self.start_capture()?;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("pipeline shutdown requested");
                    break;
                }
                outcome = self.run_turn() => match outcome {
                    Ok(TurnOutcome::Placed { id }) => tracing::info!(%id, "turn complete, object placed"),
                    Ok(TurnOutcome::FollowUp) => tracing::info!("turn complete, follow-up only"),
                    Ok(TurnOutcome::Aborted) => tracing::info!("turn aborted"),
                    Err(e) => {
                        tracing::error!(error = %e, "turn failed");
                        if self.session.is_none() {
                            self.start_capture()?;
                        }
                    }
                }
            }
        }

        if let Some(session) = self.session.take() {
            session.stop();
        }
        self.phase = TurnPhase::Idle;
        Ok(())
    }

    /// Run one full turn: wait for speech, process it, reopen the microphone
    async fn run_turn(&mut self) -> Result<TurnOutcome> {
        let transcript = self.await_final_transcript().await?;
        let outcome = self.process_transcript(transcript).await?;

        tokio::time::sleep(self.config.turn_pause).await;
        self.start_capture()?;

        Ok(outcome)
    }

    /// Drive one turn from an already-finalized transcript.
    ///
    /// Appends the user turn, completes the conversation, speaks the reply,
    /// and, when the reply describes an object, generates and places it.
    /// Ends back at [`TurnPhase::Idle`] on every outcome; restarting capture
    /// is the caller's concern.
    ///
    /// # Errors
    ///
    /// Returns error only if broadcasting the placement fails to serialize;
    /// external-service failures are reported as [`TurnOutcome::Aborted`].
    pub async fn process_transcript(&mut self, transcript: String) -> Result<TurnOutcome> {
        tracing::info!(transcript = %transcript, "user turn");
        self.history.push(ConversationTurn::user(transcript));

        // Transcribed → Responded
        let reply = match self.complete().await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "language model failed, aborting turn");
                self.phase = TurnPhase::Idle;
                return Ok(TurnOutcome::Aborted);
            }
        };
        tracing::info!(reply = %reply, "assistant turn");
        self.history.push(ConversationTurn::assistant(reply.clone()));
        self.phase = TurnPhase::Responded;

        // Responded → Synthesized; playback failure never kills the turn
        if let Err(e) = self.speak(&reply).await {
            tracing::warn!(error = %e, "synthesis failed, skipping playback");
        }
        self.phase = TurnPhase::Synthesized;

        let Some(description) = extract_object_description(&reply) else {
            tracing::info!("no object description in reply, treating as follow-up");
            self.phase = TurnPhase::Idle;
            return Ok(TurnOutcome::FollowUp);
        };

        // Synthesized → AssetRequested
        let asset_path = match self.generate_asset(&description).await {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(error = %e, "asset generation failed, aborting turn");
                self.phase = TurnPhase::Idle;
                return Ok(TurnOutcome::Aborted);
            }
        };
        self.phase = TurnPhase::AssetRequested;

        // AssetRequested → Placed
        let id = self.place(&asset_path).await?;
        self.phase = TurnPhase::Placed;

        self.phase = TurnPhase::Idle;
        Ok(TurnOutcome::Placed { id })
    }

    /// Open a capture session. At most one session may be active.
    ///
    /// # Errors
    ///
    /// Returns error if a session is already open or the worker cannot spawn
    fn start_capture(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Err(Error::Voice("capture session already active".to_string()));
        }
        self.session = Some(CaptureSession::start(Arc::clone(&self.services.transcriber))?);
        self.phase = TurnPhase::CaptureStarted;
        Ok(())
    }

    /// Wait for the first final transcript fragment, then stop the session.
    ///
    /// Interim fragments are informational only and do not advance the turn.
    async fn await_final_transcript(&mut self) -> Result<String> {
        loop {
            let fragment = match self.session.as_mut() {
                Some(session) => session.next_fragment().await,
                None => return Err(Error::Voice("no capture session active".to_string())),
            };

            match fragment {
                Some(fragment) if fragment.is_final => {
                    // Capture pauses while the turn is processed; the user
                    // cannot speak over the assistant's turn
                    if let Some(session) = self.session.take() {
                        session.stop();
                    }
                    self.phase = TurnPhase::Transcribed;
                    return Ok(fragment.text);
                }
                Some(fragment) => {
                    tracing::debug!(interim = %fragment.text, "interim transcript");
                }
                None => {
                    self.session = None;
                    return Err(Error::Voice(
                        "capture session ended without a transcript".to_string(),
                    ));
                }
            }
        }
    }

    /// Complete the conversation with a bounded wait
    async fn complete(&self) -> Result<String> {
        match timeout(
            self.config.service_timeout,
            self.services.chat.complete(&self.history),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Llm("completion timed out".to_string())),
        }
    }

    /// Synthesize and play `text`. A disabled playback device skips both.
    async fn speak(&self, text: &str) -> Result<()> {
        let Some(playback) = &self.services.playback else {
            tracing::debug!("playback disabled, skipping synthesis");
            return Ok(());
        };

        let audio = match timeout(
            self.config.service_timeout,
            self.services.synthesizer.synthesize(text),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(Error::Tts("synthesis timed out".to_string())),
        };

        playback.play_mp3(&audio)
    }

    /// Generate the described asset with a bounded wait
    async fn generate_asset(&self, description: &str) -> Result<PathBuf> {
        tracing::info!(description = %description, "object description extracted");
        match timeout(
            self.config.service_timeout,
            self.services.assets.generate(description),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Asset("asset generation timed out".to_string())),
        }
    }

    /// Refresh the world snapshot, pick a clear spot, and broadcast the
    /// placement
    async fn place(&mut self, asset_path: &Path) -> Result<String> {
        self.services.query.request().await?;
        tokio::time::sleep(self.config.position_grace).await;

        let existing = self
            .services
            .cache
            .read()
            .map(|snapshot| snapshot.planar_positions())
            .unwrap_or_default();

        let position = choose_position(
            &mut self.rng,
            &existing,
            &self.config.bounds,
            self.config.min_distance,
            self.config.max_attempts,
        );
        let rotation = random_rotation(&mut self.rng);
        let scale = random_scale(&mut self.rng, self.config.scale_min, self.config.scale_max);

        let path = asset_wire_path(asset_path);
        let id = placement_id(&mut self.rng, object_type_from_path(&path));
        let message = ServerMessage::LoadObject {
            id: id.clone(),
            path,
            position,
            rotation,
            scale,
        };

        let delivered = self.services.broadcaster.broadcast(&message).await?;
        tracing::info!(
            %id,
            delivered,
            x = position.x,
            z = position.z,
            "placement broadcast"
        );
        Ok(id)
    }
}

/// Extract the object description following the assistant's lead-in phrase.
///
/// Returns `None` when the reply is a conversational follow-up with no
/// description.
#[must_use]
pub fn extract_object_description(reply: &str) -> Option<String> {
    let normalized = reply.replace('\u{2019}', "'");
    let lower = normalized.to_lowercase();
    let start = lower.find(OBJECT_LEAD_IN)?;
    let tail = normalized.get(start + OBJECT_LEAD_IN.len()..)?;

    let description = tail
        .trim_start_matches([' ', ':', ','])
        .trim()
        .trim_end_matches(['.', '!', '?'])
        .trim();

    if description.is_empty() {
        None
    } else {
        Some(description.to_string())
    }
}
