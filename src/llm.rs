//! Client for an OpenAI-compatible chat-completions API.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;

const SYSTEM_PROMPT: &str = "You are a homelab assistant that helps operate a fleet of Docker \
containers. Answer concisely. When container state is provided, base your answer on it.";

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Language model API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Language model returned no answer")]
    EmptyResponse,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    timeout: Duration,
}

impl LlmClient {
    /// `None` when the section has no API key.
    pub fn from_config(client: reqwest::Client, config: &LlmConfig) -> Option<Self> {
        let Some(api_key) = config.api_key() else {
            log::warn!("Language model configured without an API key, ask is disabled");
            return None;
        };
        Some(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: api_key.to_string(),
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout),
        })
    }

    /// Sends `question`, prefixed by `context` when given.
    pub async fn ask(&self, question: &str, context: Option<&str>) -> Result<String, LlmError> {
        let user_content = match context {
            Some(context) => format!("{context}\nQuestion: {question}"),
            None => question.to_string(),
        };
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user_content,
                },
            ],
            max_tokens: self.max_tokens,
        };

        log::debug!("Forwarding question to {}", self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let response: ChatResponse = response.json().await?;
        first_answer(response)
    }
}

fn first_answer(response: ChatResponse) -> Result<String, LlmError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or(LlmError::EmptyResponse)
}
