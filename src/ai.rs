//! AI Backend Client
//!
//! Stateless wrapper around an OpenAI-compatible chat completions API
//! (Groq by default). Owns no conversation state: callers pass the
//! history window and the new user turn on every call.
//!
//! A single attempt is made per call; timeouts and non-2xx responses are
//! reported as [`AiError::Unavailable`].

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AiSettings;
use crate::history::Turn;

/// Errors surfaced by a completion backend
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("AI backend unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed AI response: {0}")]
    MalformedResponse(String),

    #[error("AI backend not configured (missing API key)")]
    NotConfigured,
}

/// Completion backend seam used by the dispatcher
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Backend/model name for logs
    fn name(&self) -> &str;

    /// Produce a reply for `[system] + history + [user_turn]`
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[Turn],
        user_turn: &Turn,
    ) -> Result<String, AiError>;
}

/// Message in the request payload
#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// API request
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    stream: bool,
}

/// API response
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

/// HTTP client for OpenAI-compatible chat completion endpoints
#[derive(Clone)]
pub struct GrokClient {
    client: Client,
    settings: AiSettings,
}

impl GrokClient {
    pub fn new(settings: AiSettings) -> Result<Self, AiError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|e| AiError::Unavailable(format!("HTTP client init failed: {}", e)))?;
        Ok(Self { client, settings })
    }

    /// Check if API key is configured
    pub fn is_available(&self) -> bool {
        self.settings.api_key.is_some()
    }

    fn build_request<'a>(
        &'a self,
        system_prompt: &'a str,
        history: &'a [Turn],
        user_turn: &'a Turn,
    ) -> CompletionRequest<'a> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage {
            role: "system",
            content: system_prompt,
        });
        messages.extend(
            history
                .iter()
                .chain(std::iter::once(user_turn))
                .map(|turn| ChatMessage {
                    role: turn.role.as_str(),
                    content: &turn.content,
                }),
        );

        CompletionRequest {
            model: &self.settings.model,
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            top_p: self.settings.top_p,
            stream: false,
        }
    }
}

#[async_trait]
impl CompletionBackend for GrokClient {
    fn name(&self) -> &str {
        &self.settings.model
    }

    async fn complete(
        &self,
        system_prompt: &str,
        history: &[Turn],
        user_turn: &Turn,
    ) -> Result<String, AiError> {
        let api_key = self.settings.api_key.as_ref().ok_or(AiError::NotConfigured)?;
        let request = self.build_request(system_prompt, history, user_turn);

        debug!(
            "Calling AI API: url={}, model={}, messages={}",
            self.settings.api_url,
            self.settings.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(&self.settings.api_url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AiError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("AI API error {}: {}", status, body);
            return Err(AiError::Unavailable(format!("HTTP {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AiError::Unavailable(e.to_string()))?;
        let parsed: CompletionResponse = serde_json::from_str(&body)
            .map_err(|e| AiError::MalformedResponse(e.to_string()))?;

        if let Some(usage) = &parsed.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            );
        }

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AiError::MalformedResponse("no completion in response".to_string()))?;

        info!("AI response: model={}, len={}", self.settings.model, content.len());
        Ok(content)
    }
}
