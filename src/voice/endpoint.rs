//! Utterance endpointing
//!
//! Energy-based voice activity detection over the capture stream: speech
//! starts when RMS energy crosses a threshold and ends after a run of
//! trailing silence.

/// RMS energy above which a chunk counts as speech
const ENERGY_THRESHOLD: f32 = 0.025;

/// Minimum utterance length to bother transcribing (0.3s at 16kHz)
const MIN_UTTERANCE_SAMPLES: usize = 4800;

/// Trailing silence that ends an utterance (1s at 16kHz)
const TRAILING_SILENCE_SAMPLES: usize = 16000;

/// Detects utterance boundaries in a stream of capture chunks
#[derive(Debug, Default)]
pub struct UtteranceDetector {
    speech: Vec<f32>,
    silence_run: usize,
    speaking: bool,
}

impl UtteranceDetector {
    /// Create a detector in the idle state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of capture samples
    pub fn feed(&mut self, samples: &[f32]) {
        let energy = rms_energy(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        if self.speaking {
            self.speech.extend_from_slice(samples);
            if is_speech {
                self.silence_run = 0;
            } else {
                self.silence_run += samples.len();
            }
        } else if is_speech {
            self.speaking = true;
            self.silence_run = 0;
            self.speech.extend_from_slice(samples);
            tracing::trace!(energy, "speech started");
        }
    }

    /// Whether an utterance is in progress
    #[must_use]
    pub const fn speech_active(&self) -> bool {
        self.speaking
    }

    /// Whether the current utterance has ended (enough speech, then silence)
    #[must_use]
    pub fn utterance_complete(&self) -> bool {
        self.speaking
            && self.silence_run >= TRAILING_SILENCE_SAMPLES
            && self.speech.len() >= MIN_UTTERANCE_SAMPLES + self.silence_run
    }

    /// Samples of the utterance accumulated so far
    #[must_use]
    pub fn speech_so_far(&self) -> &[f32] {
        &self.speech
    }

    /// Take the accumulated utterance and reset to idle
    pub fn take_utterance(&mut self) -> Vec<f32> {
        let utterance = std::mem::take(&mut self.speech);
        self.silence_run = 0;
        self.speaking = false;
        utterance
    }

    /// Discard any accumulated speech and return to idle
    pub fn reset(&mut self) {
        self.speech.clear();
        self.silence_run = 0;
        self.speaking = false;
    }
}

/// RMS energy of a chunk of samples
#[allow(clippy::cast_precision_loss)]
fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
