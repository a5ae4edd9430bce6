//! Speech-capture session
//!
//! One session owns the microphone and the streaming transcription for one
//! utterance. It runs on a dedicated worker thread because audio capture is
//! a long-lived blocking concern (and cpal streams are not `Send`); the
//! finalized transcript is handed back to the async pipeline over a bounded
//! channel rather than a polled flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::voice::capture::{AudioCapture, CAPTURE_SAMPLE_RATE, encode_wav};
use crate::voice::endpoint::UtteranceDetector;
use crate::voice::stt::Transcriber;
use crate::{Error, Result};

/// Cadence at which the worker drains the capture buffer
const CHUNK_INTERVAL: Duration = Duration::from_millis(100);

/// Minimum gap between interim transcriptions of an in-progress utterance
const INTERIM_INTERVAL: Duration = Duration::from_millis(1500);

/// Minimum buffered speech before an interim transcription is worth sending
const MIN_INTERIM_SAMPLES: usize = CAPTURE_SAMPLE_RATE as usize;

/// A transcript fragment reported by the capture worker.
///
/// Interim fragments are informational only; the first final fragment ends
/// the session.
#[derive(Debug, Clone)]
pub struct TranscriptFragment {
    pub text: String,
    pub is_final: bool,
}

/// Handle to a running capture session.
///
/// Dropping the handle (or calling [`CaptureSession::stop`]) signals the
/// worker to shut down; the worker also exits on its own after reporting a
/// final fragment.
pub struct CaptureSession {
    fragments: mpsc::Receiver<TranscriptFragment>,
    stop: Arc<AtomicBool>,
}

impl CaptureSession {
    /// Start a capture session on a dedicated worker thread.
    ///
    /// # Errors
    ///
    /// Returns error if the worker thread cannot be spawned. Audio device
    /// failures surface as a closed fragment channel, reported by the worker
    /// before it exits.
    pub fn start(transcriber: Arc<Transcriber>) -> Result<Self> {
        let (tx, rx) = mpsc::channel(8);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let runtime = tokio::runtime::Handle::current();

        std::thread::Builder::new()
            .name("speech-capture".to_string())
            .spawn(move || {
                if let Err(e) = capture_worker(&transcriber, &runtime, &tx, &stop_flag) {
                    tracing::error!(error = %e, "capture worker failed");
                }
            })
            .map_err(|e| Error::Voice(format!("failed to spawn capture worker: {e}")))?;

        tracing::debug!("capture session started");
        Ok(Self { fragments: rx, stop })
    }

    /// Await the next transcript fragment.
    ///
    /// Returns `None` once the worker has exited and all fragments have been
    /// drained.
    pub async fn next_fragment(&mut self) -> Option<TranscriptFragment> {
        self.fragments.recv().await
    }

    /// Stop the session. The worker notices within one chunk interval.
    pub fn stop(self) {
        self.stop.store(true, Ordering::Relaxed);
        tracing::debug!("capture session stopped");
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// Worker loop: drain the mic, endpoint utterances, transcribe, report.
fn capture_worker(
    transcriber: &Transcriber,
    runtime: &tokio::runtime::Handle,
    fragments: &mpsc::Sender<TranscriptFragment>,
    stop: &AtomicBool,
) -> Result<()> {
    let mut capture = AudioCapture::open()?;
    capture.start()?;

    let mut detector = UtteranceDetector::new();
    let mut last_interim = Instant::now();

    while !stop.load(Ordering::Relaxed) {
        std::thread::sleep(CHUNK_INTERVAL);

        let chunk = capture.take_buffer();
        if !chunk.is_empty() {
            detector.feed(&chunk);
        }

        if detector.utterance_complete() {
            let utterance = detector.take_utterance();
            let wav = encode_wav(&utterance, CAPTURE_SAMPLE_RATE)?;

            match runtime.block_on(transcriber.transcribe(&wav)) {
                Ok(text) if !text.trim().is_empty() => {
                    tracing::info!(transcript = %text, "utterance finalized");
                    let fragment = TranscriptFragment { text, is_final: true };
                    let _ = fragments.blocking_send(fragment);
                    break;
                }
                Ok(_) => {
                    tracing::debug!("empty transcription, listening again");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "transcription failed, listening again");
                }
            }
        } else if detector.speech_active()
            && detector.speech_so_far().len() >= MIN_INTERIM_SAMPLES
            && last_interim.elapsed() >= INTERIM_INTERVAL
        {
            last_interim = Instant::now();
            let wav = encode_wav(detector.speech_so_far(), CAPTURE_SAMPLE_RATE)?;
            if let Ok(text) = runtime.block_on(transcriber.transcribe(&wav)) {
                if !text.trim().is_empty() {
                    let fragment = TranscriptFragment { text, is_final: false };
                    if fragments.blocking_send(fragment).is_err() {
                        break;
                    }
                }
            }
        }
    }

    capture.stop();
    tracing::debug!("capture worker exited");
    Ok(())
}
