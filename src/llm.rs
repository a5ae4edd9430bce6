//! Language-model client for conversation turns

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Who produced a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of the conversation.
///
/// Turns accumulate in an ordered, append-only history; the full history is
/// sent to the model on every completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    /// A system turn
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// A user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// An assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Completion backend for the conversation pipeline.
///
/// The orchestrator only depends on this seam, so tests can swap in a
/// scripted or failing model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Complete the conversation, returning the assistant's reply text
    async fn complete(&self, turns: &[ConversationTurn]) -> Result<String>;
}

/// Chat-completions client speaking the `OpenAI` wire format
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ConversationTurn],
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

impl OpenAiChat {
    /// Create a new chat client
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(api_key: String, model: String, temperature: f32) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for chat completions".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            temperature,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, turns: &[ConversationTurn]) -> Result<String> {
        tracing::debug!(turns = turns.len(), model = %self.model, "requesting completion");

        let request = CompletionRequest {
            model: &self.model,
            messages: turns,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "completion request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "completion API error");
            return Err(Error::Llm(format!("completion API error {status}: {body}")));
        }

        let result: CompletionResponse = response.json().await?;
        let reply = result
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::Llm("completion returned no content".to_string()))?;

        tracing::info!(chars = reply.len(), "completion received");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_serialize_with_lowercase_roles() {
        let turn = ConversationTurn::user("make a tree");
        let json = serde_json::to_string(&turn).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"make a tree"}"#);

        let turn = ConversationTurn::system("you are a world builder");
        assert!(serde_json::to_string(&turn).unwrap().contains("\"system\""));
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let result = OpenAiChat::new(String::new(), "gpt-4o-mini".to_string(), 0.5);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
