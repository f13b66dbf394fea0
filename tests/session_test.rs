//! Session persistence and the clarification flow on top of it

use agent_workflows::agent::clarify::{ClarificationAgent, ClarifyError, ClarifyOutcome, InputKind};
use agent_workflows::types::{Message, Role};
use agent_workflows::{Capability, CapabilityError, CapabilityRequest, SessionContext, SessionStore, SqliteSessionStore};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Replies from a fixed queue and records what it was sent
struct QueuedReplies {
    replies: Mutex<Vec<String>>,
    seen: Mutex<Vec<CapabilityRequest>>,
}

impl QueuedReplies {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Capability for QueuedReplies {
    async fn complete(&self, request: CapabilityRequest) -> Result<String, CapabilityError> {
        self.seen.lock().unwrap().push(request);
        self.replies.lock().unwrap().pop().ok_or(CapabilityError::EmptyResponse)
    }
}

#[tokio::test]
async fn test_sqlite_store_survives_reopen() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let db = dir.path().join("nested").join("sessions.db");

    {
        let store = SqliteSessionStore::open(&db).await?;
        store.append("s1", &Message::new(Role::User, "query: first")).await?;
        store.append("s1", &Message::new(Role::Assistant, "reply")).await?;
        store.append("s2", &Message::new(Role::User, "query: other")).await?;
    }

    let store = SqliteSessionStore::open(&db).await?;
    let turns = store.turns("s1").await?;
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].content, "query: first");
    assert_eq!(turns[1].role, Role::Assistant);
    assert_eq!(store.sessions().await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_clarification_round_trip_is_persisted() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::open(dir.path().join("s.db")).await?);
    let capability = Arc::new(QueuedReplies::new(&[
        r#"{"type": "follow_up", "questions": ["Which market?"]}"#,
        r#"{"type": "answer", "content": "Research brief: EV market in Norway"}"#,
    ]));
    let agent = ClarificationAgent::new(capability.clone(), "chat-model");
    let session = SessionContext::new("research-1", store.clone());

    let first = agent.turn(&session, InputKind::Query, "EV market").await?;
    assert_eq!(first, ClarifyOutcome::FollowUp(vec!["Which market?".into()]));

    let second = agent.turn(&session, InputKind::Clarification, "Norway").await?;
    assert_eq!(second, ClarifyOutcome::Answer("Research brief: EV market in Norway".into()));

    let stored = store.turns("research-1").await?;
    let user_turns: Vec<&str> = stored
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(user_turns, vec!["query: EV market", "clarification: Norway"]);

    let seen = capability.seen.lock().unwrap();
    assert_eq!(seen[1].turns.len(), 3);
    assert!(seen.iter().all(|r| r.model == "chat-model"));
    Ok(())
}

#[tokio::test]
async fn test_follow_up_budget_tracks_stored_history() -> anyhow::Result<()> {
    let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::in_memory()?);
    let follow_up = r#"{"type": "follow_up", "questions": ["More detail?"]}"#;
    let capability = Arc::new(QueuedReplies::new(&[follow_up, follow_up, follow_up]));
    let agent = ClarificationAgent::new(capability.clone(), "chat-model");
    let session = SessionContext::new("s", store);

    agent.turn(&session, InputKind::Query, "something").await?;
    agent.turn(&session, InputKind::Clarification, "more").await?;
    let err = agent.turn(&session, InputKind::Clarification, "even more").await.unwrap_err();

    assert!(matches!(err, ClarifyError::FollowUpLimit { max: 2 }));
    let last_system = capability.seen.lock().unwrap()[2].system.clone().unwrap_or_default();
    assert!(last_system.contains("must not ask any more questions"));
    Ok(())
}

#[tokio::test]
async fn test_resumed_session_continues_pending_clarification() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let db = dir.path().join("s.db");
    let follow_up = r#"{"type": "follow_up", "questions": ["Which market?"]}"#;
    let capability = Arc::new(QueuedReplies::new(&[follow_up, follow_up]));
    let agent = ClarificationAgent::new(capability.clone(), "chat-model").with_max_follow_ups(1);

    {
        let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::open(&db).await?);
        agent.turn(&SessionContext::new("resume-me", store), InputKind::Query, "EV market").await?;
    }

    let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::open(&db).await?);
    let resumed = SessionContext::new("resume-me", store.clone());
    assert!(agent.awaiting_clarification(&resumed).await?);

    let err = agent.turn(&resumed, InputKind::Clarification, "Norway").await.unwrap_err();
    assert!(matches!(err, ClarifyError::FollowUpLimit { max: 1 }));

    let seen = capability.seen.lock().unwrap();
    assert_eq!(seen[1].turns.last().map(|m| m.content.as_str()), Some("clarification: Norway"));
    assert!(seen[1].system.as_deref().unwrap_or_default().contains("must not ask any more questions"));
    drop(seen);
    assert_eq!(store.turns("resume-me").await?.len(), 2);
    Ok(())
}
