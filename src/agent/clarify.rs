//! Clarification chat
//!
//! A multi-turn exchange that either asks the user a few follow-up
//! questions about an unclear query or answers with a refined brief. Every
//! turn replays the whole session history, so the caller only supplies the
//! newest message.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use super::capability::{Capability, CapabilityError, CapabilityRequest};
use crate::memory::SessionContext;
use crate::orchestrator::plan::strip_code_fence;
use crate::types::{Message, Role};

const QUERY_PREFIX: &str = "query: ";
const CLARIFICATION_PREFIX: &str = "clarification: ";

/// What the newest user message is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Starts a new question
    Query,
    /// Answers earlier follow-up questions
    Clarification,
}

impl InputKind {
    fn prefix(self) -> &'static str {
        match self {
            InputKind::Query => QUERY_PREFIX,
            InputKind::Clarification => CLARIFICATION_PREFIX,
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKind::Query => write!(f, "query"),
            InputKind::Clarification => write!(f, "clarification"),
        }
    }
}

/// Structured reply expected from the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarifyResponse {
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    FollowUp,
    Answer,
}

impl ClarifyResponse {
    /// Parse a model reply, tolerating a surrounding code fence
    pub fn parse(text: &str) -> Result<Self, ClarifyError> {
        let response: Self = serde_json::from_str(strip_code_fence(text))
            .map_err(|e| ClarifyError::Malformed(format!("{} in reply: {}", e, crate::truncate_safe(text, 200))))?;

        match response.kind {
            ResponseKind::FollowUp if response.questions.iter().all(|q| q.trim().is_empty()) => {
                Err(ClarifyError::Malformed("follow_up reply carries no questions".to_string()))
            }
            ResponseKind::Answer if response.content.trim().is_empty() => {
                Err(ClarifyError::Malformed("answer reply has empty content".to_string()))
            }
            _ => Ok(response),
        }
    }

    fn into_outcome(self) -> ClarifyOutcome {
        match self.kind {
            ResponseKind::FollowUp => ClarifyOutcome::FollowUp(
                self.questions
                    .into_iter()
                    .map(|q| q.trim().to_string())
                    .filter(|q| !q.is_empty())
                    .collect(),
            ),
            ResponseKind::Answer => ClarifyOutcome::Answer(self.content),
        }
    }
}

/// Result of one clarification turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClarifyOutcome {
    /// Questions the user should answer next
    FollowUp(Vec<String>),
    /// Final answer or refined brief
    Answer(String),
}

#[derive(Debug, Error)]
pub enum ClarifyError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("clarification model failed: {0}")]
    Capability(#[from] CapabilityError),
    #[error("malformed clarification reply: {0}")]
    Malformed(String),
    #[error("model asked for more clarification after {max} follow-up rounds")]
    FollowUpLimit { max: usize },
    #[error("session store error: {0:#}")]
    Store(anyhow::Error),
}

fn system_prompt(follow_ups_left: usize) -> String {
    let mut prompt = String::from(
        "You are a senior researcher preparing a research brief. You receive the user's query \
plus any follow-up questions you asked earlier and the user's answers to them. User turns are \
prefixed with 'query:' for a new query or 'clarification:' for answers to your questions.\n\n",
    );
    if follow_ups_left > 0 {
        prompt.push_str(&format!(
            "If the query is unclear, ask for clarification. You may ask follow-up questions at most {} more time(s).\n\n",
            follow_ups_left
        ));
    } else {
        prompt.push_str("You must not ask any more questions. Answer now with the best brief you can.\n\n");
    }
    prompt.push_str(
        "Respond with JSON only, no prose and no markdown:\n\
{\"type\": \"follow_up\" | \"answer\", \"questions\": [\"...\"], \"content\": \"...\"}\n\
Use \"questions\" for type follow_up and \"content\" (a detailed markdown brief) for type answer.",
    );
    prompt
}

/// Follow-up rounds already spent on the most recent query
fn follow_ups_since_query(history: &[Message]) -> usize {
    let start = history
        .iter()
        .rposition(|m| m.role == Role::User && m.content.starts_with(QUERY_PREFIX))
        .unwrap_or(0);
    history[start..]
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .filter(|m| matches!(ClarifyResponse::parse(&m.content), Ok(r) if r.kind == ResponseKind::FollowUp))
        .count()
}

/// Runs clarification turns against one model
pub struct ClarificationAgent {
    capability: Arc<dyn Capability>,
    model: String,
    max_follow_ups: usize,
    max_tokens: u32,
}

impl ClarificationAgent {
    pub fn new(capability: Arc<dyn Capability>, model: impl Into<String>) -> Self {
        Self {
            capability,
            model: model.into(),
            max_follow_ups: 2,
            max_tokens: 4096,
        }
    }

    pub fn with_max_follow_ups(mut self, max_follow_ups: usize) -> Self {
        self.max_follow_ups = max_follow_ups;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Whether the session's latest reply asked follow-up questions that are
    /// still unanswered, so the next message is a clarification
    pub async fn awaiting_clarification(&self, session: &SessionContext) -> Result<bool, ClarifyError> {
        let history = session.history().await.map_err(ClarifyError::Store)?;
        Ok(match history.last() {
            Some(last) if last.role == Role::Assistant => {
                matches!(ClarifyResponse::parse(&last.content), Ok(r) if r.kind == ResponseKind::FollowUp)
            }
            _ => false,
        })
    }

    /// Process one user message.
    ///
    /// The user turn and the reply are stored together, only once the reply
    /// has been accepted; a failed turn leaves the session untouched.
    pub async fn turn(
        &self,
        session: &SessionContext,
        kind: InputKind,
        text: &str,
    ) -> Result<ClarifyOutcome, ClarifyError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClarifyError::EmptyMessage);
        }

        let mut turns = session.history().await.map_err(ClarifyError::Store)?;
        let user_turn = Message::new(Role::User, format!("{}{}", kind.prefix(), text));
        turns.push(user_turn.clone());

        let used = follow_ups_since_query(&turns);
        let left = self.max_follow_ups.saturating_sub(used);
        debug!("Session {}: {} follow-up round(s) used, {} left", session.session_id, used, left);

        let request = CapabilityRequest {
            model: self.model.clone(),
            system: Some(system_prompt(left)),
            turns,
            max_tokens: Some(self.max_tokens),
        };
        let reply = self.capability.complete(request).await?;
        let response = ClarifyResponse::parse(&reply)?;

        if response.kind == ResponseKind::FollowUp && left == 0 {
            return Err(ClarifyError::FollowUpLimit { max: self.max_follow_ups });
        }

        let stored = serde_json::to_string(&response)
            .map_err(|e| ClarifyError::Malformed(e.to_string()))?;
        session
            .append_turns(&[user_turn, Message::new(Role::Assistant, stored)])
            .await
            .map_err(ClarifyError::Store)?;

        let outcome = response.into_outcome();
        match &outcome {
            ClarifyOutcome::FollowUp(questions) => {
                info!("Session {}: asking {} follow-up question(s)", session.session_id, questions.len())
            }
            ClarifyOutcome::Answer(_) => info!("Session {}: answered", session.session_id),
        }
        Ok(outcome)
    }
}
