//! Durable checkpoints in SQLite. Each save appends a numbered row; loads read the newest.
//! With a retention cap only the newest rows per thread are kept.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

use super::CheckpointStore;
use crate::messages::{ConversationState, Message};

/// Metadata for one stored snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub thread_id: String,
    pub step: i64,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
}

pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
    /// Snapshots kept per thread; 0 keeps all of them.
    retention: usize,
}

impl SqliteCheckpointStore {
    /// Helper to lock the connection
    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Checkpoint database lock poisoned: {}", e))
    }

    /// Create or open the checkpoint database
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open checkpoint database")?;
        let store = Self {
            conn: Mutex::new(conn),
            retention: 0,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Keep only the newest `retention` snapshots of each thread (0 keeps all).
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                thread_id TEXT NOT NULL,
                step INTEGER NOT NULL,
                state_json TEXT NOT NULL,
                message_count INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (thread_id, step)
            );",
        )?;
        Ok(())
    }

    fn load_latest(&self, thread_id: &str) -> Result<ConversationState> {
        let conn = self.lock_conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT state_json FROM checkpoints
                 WHERE thread_id = ?1 ORDER BY step DESC LIMIT 1",
                params![thread_id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(raw) = raw else {
            return Ok(ConversationState::new());
        };

        let messages: Vec<Message> = serde_json::from_str(&raw)
            .with_context(|| format!("Corrupt checkpoint for thread '{}'", thread_id))?;
        ConversationState::try_from_messages(messages)
            .with_context(|| format!("Checkpoint for thread '{}' breaks tool pairing", thread_id))
    }

    fn append_snapshot(&self, thread_id: &str, state: &ConversationState) -> Result<()> {
        let state_json = serde_json::to_string(state).context("Failed to encode checkpoint")?;
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let next_step: i64 = tx.query_row(
            "SELECT COALESCE(MAX(step), -1) + 1 FROM checkpoints WHERE thread_id = ?1",
            params![thread_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO checkpoints (thread_id, step, state_json, message_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                thread_id,
                next_step,
                state_json,
                state.len() as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        if self.retention > 0 {
            let pruned = tx.execute(
                "DELETE FROM checkpoints WHERE thread_id = ?1 AND step <= ?2",
                params![thread_id, next_step - self.retention as i64],
            )?;
            if pruned > 0 {
                tracing::debug!(thread_id, pruned, "Pruned old checkpoints");
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Snapshot metadata for a thread, oldest first.
    pub fn list_checkpoints(&self, thread_id: &str) -> Result<Vec<CheckpointRecord>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT thread_id, step, message_count, created_at
             FROM checkpoints WHERE thread_id = ?1 ORDER BY step ASC",
        )?;
        let rows = stmt
            .query_map(params![thread_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(thread_id, step, message_count, created_at)| {
                let created_at = DateTime::parse_from_rfc3339(&created_at)
                    .with_context(|| format!("Bad checkpoint timestamp '{}'", created_at))?
                    .with_timezone(&Utc);
                Ok(CheckpointRecord {
                    thread_id,
                    step,
                    message_count: message_count as usize,
                    created_at,
                })
            })
            .collect()
    }

    /// Thread ids with at least one checkpoint.
    pub fn list_threads(&self) -> Result<Vec<String>> {
        let conn = self.lock_conn()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT thread_id FROM checkpoints ORDER BY thread_id")?;
        let threads = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(threads)
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<ConversationState> {
        self.load_latest(thread_id)
    }

    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<()> {
        self.append_snapshot(thread_id, state)
    }
}
