use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use trivia_core::ChatMessage;

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("completion provider is not configured")]
    NotConfigured,
    #[error("completion request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("completion response had no choices")]
    EmptyResponse,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait TriviaClient: Send + Sync {
    async fn request_completion(&self, history: &[ChatMessage]) -> Result<String, UpstreamError>;
}

#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiClient {
    pub fn new(url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            model: model.into(),
            api_key,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.openai_url.clone(),
            config.model.clone(),
            config.api_key.clone(),
        )
    }

    pub fn enabled(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl TriviaClient for OpenAiClient {
    async fn request_completion(&self, history: &[ChatMessage]) -> Result<String, UpstreamError> {
        let api_key = self.api_key.as_ref().ok_or(UpstreamError::NotConfigured)?;

        let payload = ChatRequest {
            model: &self.model,
            messages: history,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UpstreamError::HttpStatus(response.status()));
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(UpstreamError::EmptyResponse)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: String,
}
