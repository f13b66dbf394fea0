//! Conversation session memory
//!
//! Turn history for multi-turn chat sessions, keyed by session id. The
//! caller passes a [`SessionContext`] explicitly on every turn; nothing is
//! kept in ambient state.

pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::types::Message;

pub use sqlite::SqliteSessionStore;

/// Listing entry for one stored session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub turns: usize,
    pub last_activity: DateTime<Utc>,
}

/// Append-only turn storage, ordered by insertion
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Record one turn at the end of the session
    async fn append(&self, session_id: &str, message: &Message) -> Result<()>;

    /// Record several turns at once; either all of them land or none do
    async fn append_turns(&self, session_id: &str, messages: &[Message]) -> Result<()>;

    /// All turns of a session, oldest first (empty for unknown sessions)
    async fn turns(&self, session_id: &str) -> Result<Vec<Message>>;

    /// Drop every turn of a session
    async fn clear(&self, session_id: &str) -> Result<()>;

    /// Known sessions, most recently active first
    async fn sessions(&self) -> Result<Vec<SessionSummary>>;
}

/// Process-local store, mostly for tests and one-shot runs
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Vec<Message>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn append(&self, session_id: &str, message: &Message) -> Result<()> {
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn append_turns(&self, session_id: &str, messages: &[Message]) -> Result<()> {
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .extend_from_slice(messages);
        Ok(())
    }

    async fn turns(&self, session_id: &str) -> Result<Vec<Message>> {
        Ok(self.sessions.read().await.get(session_id).cloned().unwrap_or_default())
    }

    async fn clear(&self, session_id: &str) -> Result<()> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }

    async fn sessions(&self) -> Result<Vec<SessionSummary>> {
        let sessions = self.sessions.read().await;
        let mut summaries: Vec<SessionSummary> = sessions
            .iter()
            .filter_map(|(id, turns)| {
                turns.last().map(|last| SessionSummary {
                    session_id: id.clone(),
                    turns: turns.len(),
                    last_activity: last.timestamp,
                })
            })
            .collect();
        summaries.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(summaries)
    }
}

/// Which session a turn belongs to and where its history lives
#[derive(Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub store: Arc<dyn SessionStore>,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            session_id: session_id.into(),
            store,
        }
    }

    /// Start a session with a fresh random id
    pub fn fresh(store: Arc<dyn SessionStore>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), store)
    }

    pub async fn append(&self, message: &Message) -> Result<()> {
        self.store.append(&self.session_id, message).await
    }

    pub async fn append_turns(&self, messages: &[Message]) -> Result<()> {
        self.store.append_turns(&self.session_id, messages).await
    }

    pub async fn history(&self) -> Result<Vec<Message>> {
        self.store.turns(&self.session_id).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear(&self.session_id).await
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}
