//! Employee documents and their embeddings stored in SQLite, ranked by cosine similarity.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection};
use serde_json::Value;
use std::cmp::Ordering;
use std::path::Path;
use std::sync::Mutex;

use super::ScoredDocument;

pub struct SqliteVectorIndex {
    conn: Mutex<Connection>,
}

impl SqliteVectorIndex {
    /// Helper to lock the connection
    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Vector index lock poisoned: {}", e))
    }

    /// Create or open the index
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open vector index database")?;
        let index = Self {
            conn: Mutex::new(conn),
        };
        index.ensure_schema()?;
        Ok(index)
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS employee_documents (
                id TEXT PRIMARY KEY,
                document TEXT NOT NULL,
                embedding BLOB NOT NULL,
                dimensions INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Insert or replace one document and its embedding.
    pub fn insert(&self, id: &str, document: &Value, embedding: &[f32]) -> Result<()> {
        if embedding.is_empty() {
            anyhow::bail!("Refusing to index document '{}' with an empty embedding", id);
        }
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO employee_documents
                 (id, document, embedding, dimensions, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                document.to_string(),
                encode_embedding(embedding),
                embedding.len() as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.lock_conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM employee_documents", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// The `k` documents closest to `query`, best first. Rows whose dimensionality differs from
    /// the query are skipped.
    pub fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<ScoredDocument>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, document, embedding FROM employee_documents WHERE dimensions = ?1",
        )?;
        let rows = stmt
            .query_map(params![query.len() as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut scored = Vec::with_capacity(rows.len());
        for (id, document, embedding) in rows {
            let document: Value = serde_json::from_str(&document)
                .with_context(|| format!("Corrupt document JSON for '{}'", id))?;
            let score = cosine_similarity(query, &decode_embedding(&embedding));
            scored.push(ScoredDocument { document, score });
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn temp_index() -> (TempDir, SqliteVectorIndex) {
        let dir = tempfile::tempdir().expect("tempdir");
        let index = SqliteVectorIndex::new(dir.path().join("index.db")).expect("index init");
        (dir, index)
    }

    #[test]
    fn nearest_ranks_by_cosine_similarity() {
        let (_dir, index) = temp_index();
        index
            .insert("e1", &json!({ "name": "Jane Doe", "department": "Engineering" }), &[1.0, 0.0])
            .unwrap();
        index
            .insert("e2", &json!({ "name": "John Roe", "department": "Sales" }), &[0.0, 1.0])
            .unwrap();
        index
            .insert("e3", &json!({ "name": "Ann Poe", "department": "Engineering" }), &[0.7, 0.7])
            .unwrap();

        let results = index.nearest(&[1.0, 0.1], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document["name"], "Jane Doe");
        assert_eq!(results[1].document["name"], "Ann Poe");
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn insert_replaces_existing_id() {
        let (_dir, index) = temp_index();
        index.insert("e1", &json!("old"), &[1.0, 0.0]).unwrap();
        index.insert("e1", &json!("new"), &[1.0, 0.0]).unwrap();

        assert_eq!(index.count().unwrap(), 1);
        let results = index.nearest(&[1.0, 0.0], 10).unwrap();
        assert_eq!(results[0].document, json!("new"));
    }

    #[test]
    fn mismatched_dimensions_and_zero_k_return_nothing() {
        let (_dir, index) = temp_index();
        index.insert("e1", &json!("doc"), &[1.0, 0.0, 0.0]).unwrap();

        assert!(index.nearest(&[1.0, 0.0], 5).unwrap().is_empty());
        assert!(index.nearest(&[1.0, 0.0, 0.0], 0).unwrap().is_empty());
        assert!(index.insert("e2", &json!("doc"), &[]).is_err());
    }

    #[test]
    fn cosine_similarity_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[2.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert_eq!(decode_embedding(&encode_embedding(&[0.5, -1.5])), vec![0.5, -1.5]);
    }
}
