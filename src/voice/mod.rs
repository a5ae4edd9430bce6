//! Voice processing
//!
//! Microphone capture, utterance endpointing, speech-to-text, text-to-speech,
//! and playback. The capture session runs on its own worker thread (cpal
//! streams are not `Send`) and hands finalized transcripts back to the
//! pipeline over a bounded channel.

mod capture;
mod endpoint;
mod playback;
mod session;
mod stt;
mod tts;

pub use capture::{AudioCapture, CAPTURE_SAMPLE_RATE, encode_wav};
pub use endpoint::UtteranceDetector;
pub use playback::Player;
pub use session::{CaptureSession, TranscriptFragment};
pub use stt::Transcriber;
pub use tts::Synthesizer;
