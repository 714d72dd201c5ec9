//! Chat Completion Client
//!
//! A minimal client for OpenAI-compatible `/chat/completions` endpoints,
//! plus the message types shared by the coaching requests.

use anyhow::{bail, Context, Result};
use log::debug;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// A provider credential. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Returns `None` for an empty or whitespace-only key.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            None
        } else {
            Some(ApiKey(key.trim().to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(****)")
    }
}

/// Everything needed to reach the model. Handed by value to the client.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: ApiKey,
    pub model: String,
    pub base_url: String,
    /// No timeout when `None`.
    pub timeout: Option<Duration>,
}

impl LlmConfig {
    pub fn new(api_key: ApiKey) -> Self {
        LlmConfig {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// How much resolution the provider should spend on an attached image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    #[default]
    Low,
    High,
    Auto,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
    pub detail: ImageDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        ChatMessage {
            role: Role::User,
            content: MessageContent::Parts(parts),
        }
    }
}

/// Something that answers a list of chat messages with text.
pub trait ChatModel {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

impl<T: ChatModel + ?Sized> ChatModel for &T {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        (**self).complete(messages)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Blocking client for an OpenAI-compatible provider.
#[derive(Clone)]
pub struct OpenAiChat {
    client: Client,
    config: LlmConfig,
}

impl OpenAiChat {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(OpenAiChat { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

impl ChatModel for OpenAiChat {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = ChatRequest {
            model: &self.config.model,
            messages,
        };

        debug!(
            "Sending {} message(s) to {} (model {})",
            messages.len(),
            self.endpoint(),
            self.config.model
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.config.api_key.expose())
            .json(&body)
            .send()
            .context("Chat completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().unwrap_or_default();
            bail!("Chat provider returned {}: {}", status, error_body);
        }

        let parsed: ChatResponse = response
            .json()
            .context("Failed to parse chat completion response")?;
        first_content(parsed)
    }
}

fn first_content(response: ChatResponse) -> Result<String> {
    match response.choices.into_iter().next() {
        Some(Choice { message: ResponseMessage { content: Some(text) } }) => Ok(text),
        Some(_) => bail!("Chat provider returned a choice without text content"),
        None => bail!("Chat provider returned no choices"),
    }
}
