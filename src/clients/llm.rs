use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, CollaboratorError, QuestionGenerator};
use crate::utils::{config::LlmSettings, logger::LOGGER};

/// Client for an OpenAI-compatible `/chat/completions` endpoint (Groq by default).
pub struct ChatCompletionClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
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

impl ChatCompletionClient {
    pub fn new(settings: &LlmSettings, timeout_secs: u64) -> Result<Self, CollaboratorError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }

    pub async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, CollaboratorError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(CollaboratorError::Disabled("language model"))?;

        let started = Instant::now();
        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(api_key)
            .json(&CompletionRequest {
                model,
                messages,
                max_tokens,
                temperature,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::Malformed(e.to_string()))?;

        LOGGER.log_performance_metric(
            "llm_completion_ms",
            started.elapsed().as_millis() as f64,
            [("model".to_string(), model.to_string())].into_iter().collect(),
        );

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| CollaboratorError::Malformed("completion had no content".to_string()))
    }
}

/// Interviewer persona backed by the chat completion client.
pub struct LlmInterviewer {
    client: Arc<ChatCompletionClient>,
    model: String,
}

impl LlmInterviewer {
    pub fn new(client: Arc<ChatCompletionClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl QuestionGenerator for LlmInterviewer {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, CollaboratorError> {
        self.client.complete(&self.model, messages, 300, 0.7).await
    }
}
