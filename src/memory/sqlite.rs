//! SQLite-backed session store

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{SessionStore, SessionSummary};
use crate::types::{Message, Role};

/// Session turns persisted in one SQLite file
pub struct SqliteSessionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSessionStore {
    /// Open (or create) the store at the given path
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open session database {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Store that lives only as long as this value
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS session_turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_session_turns_session ON session_turns(session_id, id);
        "#)?;
        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Bad timestamp in session store: {}", raw))?
        .with_timezone(&Utc))
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn append(&self, session_id: &str, message: &Message) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO session_turns (session_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                session_id,
                message.role.to_openai_string(),
                message.content,
                message.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn append_turns(&self, session_id: &str, messages: &[Message]) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO session_turns (session_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for message in messages {
                stmt.execute(params![
                    session_id,
                    message.role.to_openai_string(),
                    message.content,
                    message.timestamp.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn turns(&self, session_id: &str) -> Result<Vec<Message>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT role, content, created_at FROM session_turns WHERE session_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (role, content, created_at) = row?;
            let role = Role::from_openai_string(&role)
                .with_context(|| format!("Unknown role '{}' in session {}", role, session_id))?;
            messages.push(Message {
                role,
                content,
                timestamp: parse_timestamp(&created_at)?,
            });
        }
        Ok(messages)
    }

    async fn clear(&self, session_id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM session_turns WHERE session_id = ?1", params![session_id])?;
        Ok(())
    }

    async fn sessions(&self) -> Result<Vec<SessionSummary>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT session_id, COUNT(*), MAX(created_at) FROM session_turns \
             GROUP BY session_id ORDER BY MAX(id) DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (session_id, turns, last) = row?;
            summaries.push(SessionSummary {
                session_id,
                turns: turns as usize,
                last_activity: parse_timestamp(&last)?,
            });
        }
        Ok(summaries)
    }
}
