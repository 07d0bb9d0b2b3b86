//! Vector retrieval over employee records.

pub mod embedding;
pub mod sqlite_index;
pub mod store;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use embedding::EmbeddingClient;
pub use sqlite_index::SqliteVectorIndex;
pub use store::EmbeddingVectorStore;

/// A stored document with its relevance to a query. Higher scores are more relevant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: Value,
    pub score: f64,
}

#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Up to `k` documents ordered by descending score.
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>>;
}
