//! Thread-scoped persistence of conversation state.
//!
//! Every save is a full snapshot of the history, never a diff, so the newest checkpoint alone
//! is enough to resume a thread.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::messages::ConversationState;

pub use memory::MemoryCheckpointStore;
pub use sqlite::{CheckpointRecord, SqliteCheckpointStore};

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// The newest snapshot for `thread_id`, or an empty state for an unknown thread.
    async fn load(&self, thread_id: &str) -> Result<ConversationState>;

    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<()>;
}
