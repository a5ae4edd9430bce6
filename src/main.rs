use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use conjure_gateway::daemon::DaemonMode;
use conjure_gateway::voice::{AudioCapture, Player};
use conjure_gateway::{Config, Daemon};

/// Conjure - voice-driven object conjuring gateway for shared 3D worlds
#[derive(Parser)]
#[command(name = "conjure", version, about)]
struct Cli {
    /// Path to a TOML config file (defaults to the standard location)
    #[arg(short, long, env = "CONJURE_CONFIG")]
    config: Option<PathBuf>,

    /// Port for the viewer-facing WebSocket server
    #[arg(long, env = "CONJURE_PORT")]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable the voice pipeline (headless world server)
    #[arg(long, env = "CONJURE_DISABLE_VOICE")]
    disable_voice: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Drop a configured asset into the world on a timer instead of running
    /// the conversation pipeline
    Ambient {
        /// Asset path viewers should load
        #[arg(long)]
        asset: Option<String>,

        /// Seconds between placements
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Generate a single model from a text description and save it
    Generate {
        /// Object description
        prompt: String,

        /// Generation seed
        #[arg(long, default_value = "1")]
        seed: u32,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check whether the asset generation service is up
    AssetHealth,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the speech synthesis pipeline.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,conjure_gateway=info",
        1 => "info,conjure_gateway=debug",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref(), cli.disable_voice)?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    match cli.command {
        Some(Command::Ambient { asset, interval }) => {
            if let Some(asset) = asset {
                config.world.ambient_asset = asset;
            }
            if let Some(interval) = interval {
                config.world.ambient_interval_secs = interval;
            }
            tracing::info!(
                port = config.server.port,
                asset = %config.world.ambient_asset,
                "starting conjure gateway (ambient mode)"
            );
            Daemon::new(config, DaemonMode::Ambient).run().await?;
        }
        Some(Command::Generate { prompt, seed, output }) => {
            generate_once(&config, &prompt, seed, output).await?;
        }
        Some(Command::AssetHealth) => {
            asset_health(&config).await?;
        }
        Some(Command::TestMic { duration }) => {
            test_mic(duration).await?;
        }
        Some(Command::TestSpeaker) => {
            test_speaker()?;
        }
        Some(Command::TestTts { text }) => {
            test_tts(&config, &text).await?;
        }
        None => {
            tracing::info!(
                port = config.server.port,
                voice = config.voice.enabled,
                "starting conjure gateway"
            );
            Daemon::new(config, DaemonMode::Conversation).run().await?;
        }
    }

    Ok(())
}

/// Generate one model and report where it was saved
async fn generate_once(
    config: &Config,
    prompt: &str,
    seed: u32,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let output_dir = output.unwrap_or_else(|| config.assets.output_dir.clone());
    let generator = conjure_gateway::assets::AssetGenerator::new(
        config.assets.base_url.clone(),
        output_dir,
        seed,
    )?;

    println!("Generating model for: \"{prompt}\"");
    let path = generator.generate(prompt).await?;
    println!("Model saved to {}", path.display());
    Ok(())
}

/// Probe the asset service health endpoint
async fn asset_health(config: &Config) -> anyhow::Result<()> {
    let generator = conjure_gateway::assets::AssetGenerator::new(
        config.assets.base_url.clone(),
        config.assets.output_dir.clone(),
        config.assets.seed,
    )?;

    match generator.health().await {
        Ok(true) => println!("Asset service at {} is healthy", config.assets.base_url),
        Ok(false) => println!("Asset service at {} reported unhealthy", config.assets.base_url),
        Err(e) => println!("Asset service unreachable: {e}"),
    }
    Ok(())
}

/// Test microphone input with a live level meter
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Capturing microphone for {duration} seconds, speak now...");

    let mut capture = AudioCapture::open()?;
    capture.start()?;

    for second in 1..=duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let rms = if samples.is_empty() {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let mean_square = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
            mean_square.sqrt()
        };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (rms * 100.0).min(50.0) as usize;
        println!(
            "[{second:2}s] RMS {rms:.4} [{}{}]",
            "#".repeat(meter_len),
            " ".repeat(50 - meter_len)
        );
    }

    capture.stop();
    println!("If the meter moved, your microphone works.");
    Ok(())
}

/// Test speaker output with a short sine tone
fn test_speaker() -> anyhow::Result<()> {
    println!("Playing a 440Hz tone for 2 seconds...");

    let player = Player::open()?;

    let sample_rate = 24000.0_f32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let num_samples = (sample_rate * 2.0) as usize;
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate;
            (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.3
        })
        .collect();

    player.play_samples(&samples)?;
    println!("If you heard the tone, your speakers work.");
    Ok(())
}

/// Synthesize and play a test phrase
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Synthesizing: \"{text}\"");

    let synthesizer = match config.voice.tts_provider.as_str() {
        "elevenlabs" => conjure_gateway::voice::Synthesizer::elevenlabs(
            config.api_keys.elevenlabs.clone().unwrap_or_default(),
            config.voice.tts_model.clone(),
            config.voice.tts_voice.clone(),
        )?,
        _ => conjure_gateway::voice::Synthesizer::openai(
            config.api_keys.openai.clone().unwrap_or_default(),
            config.voice.tts_model.clone(),
            config.voice.tts_voice.clone(),
            config.voice.tts_speed,
        )?,
    };

    let audio = synthesizer.synthesize(text).await?;
    println!("Got {} bytes of audio", audio.len());

    let player = Player::open()?;
    player.play_mp3(&audio)?;
    println!("If you heard the phrase, TTS works.");
    Ok(())
}
