//! LLM client for OpenAI-compatible chat completion APIs (OpenRouter by default)

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::capability::{Capability, CapabilityError, CapabilityRequest};
use crate::config::Config;

const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

// ============ Provider Configuration ============

/// Configuration for an LLM API provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL for the API (e.g., "https://openrouter.ai/api/v1")
    pub base_url: String,
    /// API key for authentication
    pub api_key: String,
    /// Extra headers to include in requests (e.g., X-Title, HTTP-Referer)
    pub extra_headers: Vec<(String, String)>,
}

impl ProviderConfig {
    /// Create an OpenRouter provider configuration
    pub fn openrouter(api_key: String) -> Self {
        Self {
            base_url: OPENROUTER_BASE_URL.to_string(),
            api_key,
            extra_headers: vec![
                ("HTTP-Referer".to_string(), "https://github.com/agent-workflows".to_string()),
                ("X-Title".to_string(), "Agent Workflows".to_string()),
            ],
        }
    }

    /// Any OpenAI-compatible endpoint (Gemini, DeepSeek, Groq, Ollama, ...)
    pub fn custom(base_url: impl Into<String>, api_key: String) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            extra_headers: Vec::new(),
        }
    }
}

/// LLM API client
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Arc<Client>,
    provider: ProviderConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }
}

impl OpenRouterClient {
    /// Create a new OpenRouter client
    pub fn new(api_key: String) -> Self {
        Self::with_provider(ProviderConfig::openrouter(api_key))
    }

    /// Create a client with a specific provider configuration
    pub fn with_provider(config: ProviderConfig) -> Self {
        Self {
            client: Arc::new(Client::new()),
            provider: config,
        }
    }

    /// Create client from config (API key from env, keyring or file)
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = crate::security::keyring::get_api_key_with_env(&config.provider.api_key_env)?;
        let provider = if config.provider.base_url.trim_end_matches('/') == OPENROUTER_BASE_URL {
            ProviderConfig::openrouter(api_key)
        } else {
            ProviderConfig::custom(config.provider.base_url.clone(), api_key)
        };
        Ok(Self::with_provider(provider))
    }

    /// Get the provider configuration
    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    /// Send a chat completion request
    pub async fn chat_completion(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        max_tokens: Option<u32>,
    ) -> Result<String, CapabilityError> {
        let request = ChatRequest {
            model: model.to_string(),
            messages,
            max_tokens,
        };

        let mut req_builder = self.client
            .post(format!("{}/chat/completions", self.provider.base_url))
            .header("Authorization", format!("Bearer {}", self.provider.api_key));
        for (key, value) in &self.provider.extra_headers {
            req_builder = req_builder.header(key.as_str(), value.as_str());
        }
        let response = req_builder
            .json(&request)
            .send()
            .await
            .map_err(|e| CapabilityError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::Api { status, body });
        }

        let body = response.text().await
            .map_err(|e| CapabilityError::Transport(e.to_string()))?;
        debug!(model, bytes = body.len(), "LLM response received");

        let raw_response: Value = serde_json::from_str(&body)
            .map_err(|e| CapabilityError::MalformedResponse(
                format!("{} (body: {})", e, crate::truncate_safe(&body, 500))
            ))?;

        let content = extract_content(&raw_response).ok_or_else(|| {
            CapabilityError::MalformedResponse(format!(
                "no choices[0].message.content (body: {})",
                crate::truncate_safe(&body, 500)
            ))
        })?;

        if content.trim().is_empty() {
            return Err(CapabilityError::EmptyResponse);
        }
        Ok(content)
    }
}

/// Pull the assistant text out of a chat completion body.
/// Some models return content as `"hello"`, others as `[{"type":"text","text":"hello"}]`.
fn extract_content(raw: &Value) -> Option<String> {
    let content = raw
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?;

    match content {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => Some(parts.iter().filter_map(|part| {
            if part.get("type").and_then(|t| t.as_str()) == Some("text") {
                part.get("text").and_then(|t| t.as_str()).map(|s| s.to_string())
            } else {
                None
            }
        }).collect::<Vec<_>>().join("")),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

/// Flatten a capability request into chat messages
pub fn to_chat_messages(request: &CapabilityRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(request.turns.len() + 1);
    if let Some(system) = &request.system {
        messages.push(ChatMessage::system(system.clone()));
    }
    for turn in &request.turns {
        messages.push(ChatMessage {
            role: turn.role.to_openai_string().to_string(),
            content: turn.content.clone(),
        });
    }
    messages
}

#[async_trait]
impl Capability for OpenRouterClient {
    async fn complete(&self, request: CapabilityRequest) -> Result<String, CapabilityError> {
        let messages = to_chat_messages(&request);
        self.chat_completion(&request.model, messages, request.max_tokens).await
    }
}
