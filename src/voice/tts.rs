//! Text-to-speech over HTTP

use serde::Serialize;

use crate::{Error, Result};

/// Supported synthesis backends
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Backend {
    OpenAi,
    ElevenLabs,
}

/// Synthesizes speech (MP3) from text
pub struct Synthesizer {
    client: reqwest::Client,
    api_key: String,
    /// Voice name (`OpenAI`) or voice id (ElevenLabs)
    voice: String,
    model: String,
    speed: f64,
    backend: Backend,
}

impl Synthesizer {
    /// Synthesizer backed by `OpenAI` TTS
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn openai(api_key: String, model: String, voice: String, speed: f64) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for speech synthesis".to_string(),
            ));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice,
            model,
            speed,
            backend: Backend::OpenAi,
        })
    }

    /// Synthesizer backed by ElevenLabs
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn elevenlabs(api_key: String, model: String, voice_id: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "ElevenLabs API key required for speech synthesis".to_string(),
            ));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice: voice_id,
            model,
            speed: 1.0,
            backend: Backend::ElevenLabs,
        })
    }

    /// Synthesize `text`, returning MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        match self.backend {
            Backend::OpenAi => self.synthesize_openai(text).await,
            Backend::ElevenLabs => self.synthesize_elevenlabs(text).await,
        }
    }

    async fn synthesize_openai(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct SpeechRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f64,
        }

        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        Ok(response.bytes().await?.to_vec())
    }

    async fn synthesize_elevenlabs(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        struct SpeechRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = format!("https://api.elevenlabs.io/v1/text-to-speech/{}", self.voice);
        let request = SpeechRequest {
            text,
            model_id: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        Ok(response.bytes().await?.to_vec())
    }
}
