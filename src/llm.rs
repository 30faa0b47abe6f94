use crate::config::Config;
use crate::error::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Per-request sampling settings.
#[derive(Debug, Clone, Copy)]
pub struct ChatOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
}

pub struct LlmClient {
    client: Client,
    config: Arc<Config>,
}

impl LlmClient {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.config.endpoint.as_str().trim_end_matches('/'),
            self.config.deployment,
            self.config.api_version
        )
    }

    pub fn default_options(&self) -> ChatOptions {
        ChatOptions {
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }

    /// Send a chat request to the deployment and return the first choice
    pub async fn chat(&self, messages: &[Message], options: ChatOptions) -> Result<Completion> {
        let url = self.completions_url();
        debug!(
            "Sending {} messages to deployment {}",
            messages.len(),
            self.config.deployment
        );

        let request = ChatRequest {
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("api-key", self.config.api_key.expose())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(err) => format!("(error body unreadable: {})", err.without_url()),
            };
            return Err(Error::upstream(status.as_u16(), &body));
        }

        let bytes = response.bytes().await?;
        let chat_response: ChatResponse = serde_json::from_slice(&bytes)
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;

        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or(Error::EmptyCompletion)?;
        let content = choice.message.content.ok_or(Error::EmptyCompletion)?;

        if let Some(ref usage) = chat_response.usage {
            info!(
                "Completion from {}: {} prompt + {} completion tokens",
                self.config.deployment, usage.prompt_tokens, usage.completion_tokens
            );
        }

        Ok(Completion {
            content,
            finish_reason: choice.finish_reason,
            usage: chat_response.usage,
        })
    }
}
