//! The single external capability every pipeline stage relies on:
//! run a prompt against a backing model and get text back.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::types::{Message, Role};

/// Failure of one capability call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("request to LLM provider failed: {0}")]
    Transport(String),
    #[error("LLM API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("malformed LLM response: {0}")]
    MalformedResponse(String),
    #[error("LLM returned an empty response")]
    EmptyResponse,
    #[error("LLM call timed out after {0:?}")]
    Timeout(Duration),
}

/// One prompt addressed to one backing model
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityRequest {
    /// Backing model identity (e.g. "openai/gpt-4o-mini")
    pub model: String,
    pub system: Option<String>,
    /// Conversation turns, oldest first; the last one is the newest prompt
    pub turns: Vec<Message>,
    pub max_tokens: Option<u32>,
}

impl CapabilityRequest {
    /// Single-turn request
    pub fn prompt(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            turns: vec![Message::new(Role::User, prompt)],
            max_tokens: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Text of the newest user turn
    pub fn last_prompt(&self) -> &str {
        self.turns
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

/// Maps a text prompt to a text response
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Capability: Send + Sync {
    async fn complete(&self, request: CapabilityRequest) -> Result<String, CapabilityError>;
}
