//! Speaker playback

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};

use crate::{Error, Result};

/// Playback sample rate (matches common TTS output)
const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Plays synthesized audio on the default output device
pub struct Player {
    device: Device,
    config: StreamConfig,
}

impl Player {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns error if no output device supports the playback rate
    pub fn open() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                (c.channels() == 1 || c.channels() == 2)
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable output config available".to_string()))?;

        let config = supported
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "output device opened"
        );

        Ok(Self { device, config })
    }

    /// Decode MP3 bytes and play them to completion
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    pub fn play_mp3(&self, mp3: &[u8]) -> Result<()> {
        let samples = decode_mp3(mp3)?;
        self.play_samples(&samples)
    }

    /// Play mono f32 samples to completion, blocking the caller
    ///
    /// # Errors
    ///
    /// Returns error if the output stream cannot be built
    pub fn play_samples(&self, samples: &[f32]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let channels = self.config.channels as usize;
        let source: Arc<[f32]> = samples.into();
        let cursor = Arc::new(AtomicUsize::new(0));

        let source_cb = Arc::clone(&source);
        let cursor_cb = Arc::clone(&cursor);

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in out.chunks_mut(channels) {
                        let pos = cursor_cb.fetch_add(1, Ordering::Relaxed);
                        let sample = source_cb.get(pos).copied().unwrap_or(0.0);
                        frame.fill(sample);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "output stream error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        // Sleep for the clip duration, then give the device a moment to drain
        let duration_ms = (source.len() as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
        let deadline = std::time::Instant::now() + std::time::Duration::from_millis(duration_ms + 500);
        while cursor.load(Ordering::Relaxed) < source.len() {
            if std::time::Instant::now() > deadline {
                tracing::warn!("playback did not drain before deadline");
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        std::thread::sleep(std::time::Duration::from_millis(100));

        drop(stream);
        tracing::debug!(samples = source.len(), "playback complete");
        Ok(())
    }
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(mp3: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|pair| {
                        let left = f32::from(pair[0]) / 32768.0;
                        let right = f32::from(pair.get(1).copied().unwrap_or(pair[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_mp3_is_an_error_or_empty() {
        // minimp3 skips unrecognized bytes; either outcome is acceptable as
        // long as we don't panic
        match decode_mp3(&[0xde, 0xad, 0xbe, 0xef]) {
            Ok(samples) => assert!(samples.is_empty()),
            Err(Error::Audio(_)) => (),
            Err(e) => panic!("unexpected error kind: {e}"),
        }
    }
}
