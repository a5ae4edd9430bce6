//! Configuration for the Conjure gateway
//!
//! Built-in defaults overlaid by an optional TOML file, then by environment
//! variables. Every file field is optional; the file is a partial overlay.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::Result;
use crate::pipeline::{DEFAULT_GREETING, DEFAULT_SYSTEM_PROMPT, PipelineConfig};
use crate::world::Bounds;

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Viewer-facing WebSocket server
    pub server: ServerConfig,

    /// Voice input/output
    pub voice: VoiceConfig,

    /// API keys for external services
    pub api_keys: ApiKeys,

    /// Language model settings
    pub llm: LlmConfig,

    /// Asset generation service
    pub assets: AssetConfig,

    /// World bounds and placement tuning
    pub world: WorldConfig,

    /// Conversation pipeline timing and prompts
    pub pipeline: PipelineSettings,
}

/// Viewer-facing server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Enable the voice pipeline (off for headless world-server-only hosts)
    pub enabled: bool,

    /// STT backend: "whisper" or "deepgram"
    pub stt_provider: String,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    /// TTS backend: "openai" or "elevenlabs"
    pub tts_provider: String,

    /// TTS model (e.g. "tts-1", "eleven_multilingual_v2")
    pub tts_model: String,

    /// TTS voice name or voice id
    pub tts_voice: String,

    /// TTS speed multiplier (OpenAI only)
    pub tts_speed: f64,
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` key (Whisper, TTS, chat completions)
    pub openai: Option<String>,

    /// ElevenLabs key (optional TTS)
    pub elevenlabs: Option<String>,

    /// Deepgram key (optional STT)
    pub deepgram: Option<String>,
}

/// Language model settings
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f32,
}

/// Asset generation service settings
#[derive(Debug, Clone)]
pub struct AssetConfig {
    /// Base URL of the generation server
    pub base_url: String,

    /// Directory generated models are saved to
    pub output_dir: PathBuf,

    /// Generation seed passed with every request
    pub seed: u32,
}

/// World bounds and placement tuning
#[derive(Debug, Clone)]
pub struct WorldConfig {
    pub min_x: f64,
    pub max_x: f64,
    pub min_z: f64,
    pub max_z: f64,
    pub ground_y: f64,

    /// Minimum x-z distance between a new placement and reported objects
    pub min_distance: f64,

    /// Rejection-sampling attempts before best-effort placement
    pub max_attempts: u32,

    /// Per-axis scale range for placed objects
    pub scale_min: f64,
    pub scale_max: f64,

    /// Asset dropped by the ambient placement loop
    pub ambient_asset: String,

    /// Seconds between ambient placements
    pub ambient_interval_secs: u64,
}

impl WorldConfig {
    /// Placement bounds derived from the configured extents
    #[must_use]
    pub const fn bounds(&self) -> Bounds {
        Bounds {
            min_x: self.min_x,
            max_x: self.max_x,
            min_z: self.min_z,
            max_z: self.max_z,
            ground_y: self.ground_y,
        }
    }
}

/// Conversation pipeline timing and prompts
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Seconds to wait after a turn before the microphone reopens
    pub turn_pause_secs: u64,

    /// Milliseconds to wait for position replies before reading the cache
    pub position_grace_ms: u64,

    /// Per-external-call timeout in seconds
    pub service_timeout_secs: u64,

    /// Spoken greeting on startup
    pub greeting: String,

    /// System prompt seeding the conversation
    pub system_prompt: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            voice: VoiceConfig {
                enabled: true,
                stt_provider: "whisper".to_string(),
                stt_model: "whisper-1".to_string(),
                tts_provider: "openai".to_string(),
                tts_model: "tts-1".to_string(),
                tts_voice: "alloy".to_string(),
                tts_speed: 1.0,
            },
            api_keys: ApiKeys::default(),
            llm: LlmConfig {
                model: "gpt-4o-mini".to_string(),
                temperature: 0.5,
            },
            assets: AssetConfig {
                base_url: "http://localhost:8000".to_string(),
                output_dir: PathBuf::from("models"),
                seed: 1,
            },
            world: WorldConfig {
                min_x: -10.0,
                max_x: 10.0,
                min_z: -10.0,
                max_z: 10.0,
                ground_y: 0.0,
                min_distance: 3.0,
                max_attempts: 10,
                scale_min: 2.5,
                scale_max: 7.5,
                ambient_asset: "models/tree.glb".to_string(),
                ambient_interval_secs: 5,
            },
            pipeline: PipelineSettings {
                turn_pause_secs: 2,
                position_grace_ms: 1000,
                service_timeout_secs: 60,
                greeting: DEFAULT_GREETING.to_string(),
                system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the TOML file (explicit path or the
    /// standard location), then environment variables.
    ///
    /// # Errors
    ///
    /// Returns error if an explicitly given file is missing or unparsable.
    /// The standard-location file is best-effort.
    pub fn load(file: Option<&Path>, disable_voice: bool) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = file {
            let raw = std::fs::read_to_string(path)?;
            let overlay: ConfigFile = toml::from_str(&raw)?;
            config.apply(overlay);
        } else if let Some(path) = default_config_path() {
            if let Ok(raw) = std::fs::read_to_string(&path) {
                match toml::from_str::<ConfigFile>(&raw) {
                    Ok(overlay) => {
                        tracing::debug!(path = %path.display(), "loaded config file");
                        config.apply(overlay);
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "ignoring unparsable config file");
                    }
                }
            }
        }

        config.apply_env();

        if disable_voice {
            config.voice.enabled = false;
        }

        Ok(config)
    }

    /// Pipeline configuration derived from the loaded settings
    #[must_use]
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            system_prompt: self.pipeline.system_prompt.clone(),
            greeting: self.pipeline.greeting.clone(),
            turn_pause: Duration::from_secs(self.pipeline.turn_pause_secs),
            position_grace: Duration::from_millis(self.pipeline.position_grace_ms),
            service_timeout: Duration::from_secs(self.pipeline.service_timeout_secs),
            bounds: self.world.bounds(),
            min_distance: self.world.min_distance,
            max_attempts: self.world.max_attempts,
            scale_min: self.world.scale_min,
            scale_max: self.world.scale_max,
        }
    }

    /// Overlay values from a parsed config file
    #[allow(clippy::too_many_lines)]
    fn apply(&mut self, file: ConfigFile) {
        if let Some(server) = file.server {
            if let Some(host) = server.host {
                self.server.host = host;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }
        if let Some(voice) = file.voice {
            if let Some(enabled) = voice.enabled {
                self.voice.enabled = enabled;
            }
            if let Some(provider) = voice.stt_provider {
                self.voice.stt_provider = provider;
            }
            if let Some(model) = voice.stt_model {
                self.voice.stt_model = model;
            }
            if let Some(provider) = voice.tts_provider {
                self.voice.tts_provider = provider;
            }
            if let Some(model) = voice.tts_model {
                self.voice.tts_model = model;
            }
            if let Some(voice_id) = voice.tts_voice {
                self.voice.tts_voice = voice_id;
            }
            if let Some(speed) = voice.tts_speed {
                self.voice.tts_speed = speed;
            }
        }
        if let Some(keys) = file.api_keys {
            if keys.openai.is_some() {
                self.api_keys.openai = keys.openai;
            }
            if keys.elevenlabs.is_some() {
                self.api_keys.elevenlabs = keys.elevenlabs;
            }
            if keys.deepgram.is_some() {
                self.api_keys.deepgram = keys.deepgram;
            }
        }
        if let Some(llm) = file.llm {
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
        }
        if let Some(assets) = file.assets {
            if let Some(base_url) = assets.base_url {
                self.assets.base_url = base_url;
            }
            if let Some(output_dir) = assets.output_dir {
                self.assets.output_dir = PathBuf::from(output_dir);
            }
            if let Some(seed) = assets.seed {
                self.assets.seed = seed;
            }
        }
        if let Some(world) = file.world {
            if let Some(v) = world.min_x {
                self.world.min_x = v;
            }
            if let Some(v) = world.max_x {
                self.world.max_x = v;
            }
            if let Some(v) = world.min_z {
                self.world.min_z = v;
            }
            if let Some(v) = world.max_z {
                self.world.max_z = v;
            }
            if let Some(v) = world.ground_y {
                self.world.ground_y = v;
            }
            if let Some(v) = world.min_distance {
                self.world.min_distance = v;
            }
            if let Some(v) = world.max_attempts {
                self.world.max_attempts = v;
            }
            if let Some(v) = world.scale_min {
                self.world.scale_min = v;
            }
            if let Some(v) = world.scale_max {
                self.world.scale_max = v;
            }
            if let Some(v) = world.ambient_asset {
                self.world.ambient_asset = v;
            }
            if let Some(v) = world.ambient_interval_secs {
                self.world.ambient_interval_secs = v;
            }
        }
        if let Some(pipeline) = file.pipeline {
            if let Some(v) = pipeline.turn_pause_secs {
                self.pipeline.turn_pause_secs = v;
            }
            if let Some(v) = pipeline.position_grace_ms {
                self.pipeline.position_grace_ms = v;
            }
            if let Some(v) = pipeline.service_timeout_secs {
                self.pipeline.service_timeout_secs = v;
            }
            if let Some(v) = pipeline.greeting {
                self.pipeline.greeting = v;
            }
            if let Some(v) = pipeline.system_prompt {
                self.pipeline.system_prompt = v;
            }
        }
    }

    /// Overlay environment variables
    fn apply_env(&mut self) {
        if let Some(key) = env_value("OPENAI_API_KEY") {
            self.api_keys.openai = Some(key);
        }
        if let Some(key) = env_value("ELEVENLABS_API_KEY") {
            self.api_keys.elevenlabs = Some(key);
        }
        if let Some(key) = env_value("DEEPGRAM_API_KEY") {
            self.api_keys.deepgram = Some(key);
        }
        if let Some(url) = env_value("CONJURE_ASSET_URL") {
            self.assets.base_url = url;
        }
    }
}

/// A non-empty environment variable, if set
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Standard config file location (`~/.config/conjure/config.toml` on Linux)
fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "conjure", "conjure")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Top-level TOML file schema; every field is optional
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    server: Option<ServerFile>,
    voice: Option<VoiceFile>,
    api_keys: Option<ApiKeysFile>,
    llm: Option<LlmFile>,
    assets: Option<AssetsFile>,
    world: Option<WorldFile>,
    pipeline: Option<PipelineFile>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerFile {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct VoiceFile {
    enabled: Option<bool>,
    stt_provider: Option<String>,
    stt_model: Option<String>,
    tts_provider: Option<String>,
    tts_model: Option<String>,
    tts_voice: Option<String>,
    tts_speed: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiKeysFile {
    openai: Option<String>,
    elevenlabs: Option<String>,
    deepgram: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmFile {
    model: Option<String>,
    temperature: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct AssetsFile {
    base_url: Option<String>,
    output_dir: Option<String>,
    seed: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct WorldFile {
    min_x: Option<f64>,
    max_x: Option<f64>,
    min_z: Option<f64>,
    max_z: Option<f64>,
    ground_y: Option<f64>,
    min_distance: Option<f64>,
    max_attempts: Option<u32>,
    scale_min: Option<f64>,
    scale_max: Option<f64>,
    ambient_asset: Option<String>,
    ambient_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelineFile {
    turn_pause_secs: Option<u64>,
    position_grace_ms: Option<u64>,
    service_timeout_secs: Option<u64>,
    greeting: Option<String>,
    system_prompt: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert!(config.voice.enabled);
        assert!((config.world.min_distance - 3.0).abs() < f64::EPSILON);
        assert_eq!(config.world.max_attempts, 10);
    }

    #[test]
    fn partial_file_overlays_only_named_fields() {
        let mut config = Config::default();
        let overlay: ConfigFile = toml::from_str(
            r#"
            [server]
            port = 9090

            [world]
            min_distance = 5.0

            [voice]
            stt_provider = "deepgram"
            "#,
        )
        .unwrap();
        config.apply(overlay);

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!((config.world.min_distance - 5.0).abs() < f64::EPSILON);
        assert_eq!(config.voice.stt_provider, "deepgram");
        assert_eq!(config.voice.stt_model, "whisper-1");
    }

    #[test]
    fn pipeline_config_carries_world_tuning() {
        let mut config = Config::default();
        config.world.min_distance = 4.5;
        config.pipeline.position_grace_ms = 250;

        let pipeline = config.pipeline_config();
        assert!((pipeline.min_distance - 4.5).abs() < f64::EPSILON);
        assert_eq!(pipeline.position_grace, Duration::from_millis(250));
    }
}
