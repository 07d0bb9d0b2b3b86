use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::{EmbeddingClient, ScoredDocument, SqliteVectorIndex, VectorSearch};

/// Embeds the query text, then ranks the SQLite index against it.
pub struct EmbeddingVectorStore {
    embedder: EmbeddingClient,
    index: Arc<SqliteVectorIndex>,
}

impl EmbeddingVectorStore {
    pub fn new(embedder: EmbeddingClient, index: Arc<SqliteVectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Embed and store a document. String documents are embedded as-is, anything else by its
    /// JSON text.
    pub async fn add_document(&self, id: &str, document: &Value) -> Result<()> {
        let text = match document {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        let embedding = self.embedder.embed(&text).await?;
        self.index.insert(id, document, &embedding)
    }
}

#[async_trait]
impl VectorSearch for EmbeddingVectorStore {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>> {
        let embedding = self.embedder.embed(query).await?;
        self.index.nearest(&embedding, k)
    }
}
