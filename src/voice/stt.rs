//! Speech-to-text over HTTP

use serde::Deserialize;

use crate::{Error, Result};

/// Supported transcription backends
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Backend {
    Whisper,
    Deepgram,
}

/// Transcribes WAV audio to text
pub struct Transcriber {
    client: reqwest::Client,
    api_key: String,
    model: String,
    backend: Backend,
}

#[derive(Deserialize)]
struct WhisperReply {
    text: String,
}

#[derive(Deserialize)]
struct DeepgramReply {
    results: DeepgramResults,
}

#[derive(Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

impl Transcriber {
    /// Transcriber backed by `OpenAI` Whisper
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn whisper(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for Whisper transcription".to_string(),
            ));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            backend: Backend::Whisper,
        })
    }

    /// Transcriber backed by Deepgram
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn deepgram(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("Deepgram API key required".to_string()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            backend: Backend::Deepgram,
        })
    }

    /// Transcribe WAV audio to text
    ///
    /// # Errors
    ///
    /// Returns error if the transcription request fails
    pub async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        match self.backend {
            Backend::Whisper => self.transcribe_whisper(audio).await,
            Backend::Deepgram => self.transcribe_deepgram(audio).await,
        }
    }

    async fn transcribe_whisper(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(bytes = audio.len(), "transcribing via Whisper");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("utterance.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let reply: WhisperReply = response.json().await?;
        tracing::debug!(transcript = %reply.text, "transcription complete");
        Ok(reply.text)
    }

    async fn transcribe_deepgram(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(bytes = audio.len(), "transcribing via Deepgram");

        let url = format!(
            "https://api.deepgram.com/v1/listen?model={}&punctuate=true",
            self.model
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(audio.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Deepgram API error");
            return Err(Error::Stt(format!("Deepgram API error {status}: {body}")));
        }

        let reply: DeepgramReply = response.json().await?;
        let transcript = reply
            .results
            .channels
            .first()
            .and_then(|channel| channel.alternatives.first())
            .map(|alt| alt.transcript.clone())
            .unwrap_or_default();

        tracing::debug!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_are_rejected() {
        assert!(Transcriber::whisper(String::new(), "whisper-1".to_string()).is_err());
        assert!(Transcriber::deepgram(String::new(), "nova-2".to_string()).is_err());
    }

    #[test]
    fn deepgram_reply_parses() {
        let json = r#"{"results":{"channels":[{"alternatives":[{"transcript":"make a tree"}]}]}}"#;
        let reply: DeepgramReply = serde_json::from_str(json).unwrap();
        assert_eq!(
            reply.results.channels[0].alternatives[0].transcript,
            "make a tree"
        );
    }
}
