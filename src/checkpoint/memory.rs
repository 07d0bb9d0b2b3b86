use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::CheckpointStore;
use crate::messages::ConversationState;

/// In-memory checkpointer. Keeps every snapshot per thread so callers can inspect the lineage.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    threads: RwLock<HashMap<String, Vec<ConversationState>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All snapshots saved for `thread_id`, oldest first.
    pub async fn snapshots(&self, thread_id: &str) -> Vec<ConversationState> {
        self.threads
            .read()
            .await
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<ConversationState> {
        Ok(self
            .threads
            .read()
            .await
            .get(thread_id)
            .and_then(|snapshots| snapshots.last().cloned())
            .unwrap_or_default())
    }

    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<()> {
        self.threads
            .write()
            .await
            .entry(thread_id.to_string())
            .or_default()
            .push(state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Message;

    #[tokio::test]
    async fn unknown_thread_loads_empty() {
        let store = MemoryCheckpointStore::new();
        assert!(store.load("nobody").await.unwrap().is_empty());
        assert!(store.snapshots("nobody").await.is_empty());
    }

    #[tokio::test]
    async fn load_returns_latest_snapshot_per_thread() {
        let store = MemoryCheckpointStore::new();
        let mut state = ConversationState::new();
        state.push(Message::user("q1")).unwrap();
        store.save("t1", &state).await.unwrap();
        state.push(Message::assistant("a1")).unwrap();
        store.save("t1", &state).await.unwrap();

        assert_eq!(store.load("t1").await.unwrap(), state);
        assert_eq!(store.snapshots("t1").await.len(), 2);
        assert!(store.load("t2").await.unwrap().is_empty());
    }
}
