//! Case-filterable chunk vector store.
//!
//! Persists chunk embeddings with their source text and metadata in the
//! `chunk_vectors` table and serves filtered exact nearest-neighbor search
//! (brute-force cosine over the filtered candidate set — sufficient for a
//! single-node index over per-case document sets).
//!
//! Every stored chunk carries the case id and document id of its source; the
//! schema rejects untagged rows. Retrieval and deletion scope through the
//! same conjunctive equality filter, which is what makes case deletion able
//! to purge exactly the vectors it owns.
//!
//! Tie-breaking: chunks with equal similarity are ordered by insertion
//! rowid. This is implementation-defined but deterministic within one
//! process run, and tested.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, EmbeddingProvider};

/// Source metadata attached to every chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMeta {
    pub case_id: String,
    pub document_id: String,
}

/// A chunk ready for embedding and storage.
#[derive(Debug, Clone)]
pub struct ChunkInsert {
    pub text: String,
    pub chunk_index: i64,
    pub meta: ChunkMeta,
}

/// Conjunctive equality filter over chunk metadata. `None` fields match
/// everything; an empty filter matches the whole store.
#[derive(Debug, Clone, Default)]
pub struct ChunkFilter {
    pub case_id: Option<String>,
    pub document_id: Option<String>,
}

impl ChunkFilter {
    pub fn for_case(case_id: impl Into<String>) -> Self {
        Self {
            case_id: Some(case_id.into()),
            document_id: None,
        }
    }
}

/// A chunk returned from similarity search.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub text: String,
    pub score: f64,
    pub meta: ChunkMeta,
}

/// Vector store adapter over SQLite plus an injected embedding provider.
///
/// Exclusively owns the `chunk_vectors` table; no other component reads or
/// writes it.
pub struct VectorStore {
    pool: SqlitePool,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl VectorStore {
    pub fn new(pool: SqlitePool, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { pool, embedder }
    }

    /// Embed and persist a batch of chunks.
    ///
    /// A no-op only when `chunks` is empty. Embedding failure fails the
    /// whole call and nothing is written, so callers never end up with a
    /// document partially indexed and marked processed.
    pub async fn upsert(&self, chunks: &[ChunkInsert]) -> Result<u64> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed(&texts)
            .await
            .context("embedding chunk batch failed")?;

        if vectors.len() != chunks.len() {
            anyhow::bail!(
                "embedding provider returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }

        let mut tx = self.pool.begin().await?;
        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            let mut hasher = Sha256::new();
            hasher.update(chunk.text.as_bytes());
            let hash = format!("{:x}", hasher.finalize());

            sqlx::query(
                r#"
                INSERT INTO chunk_vectors (id, case_id, document_id, chunk_index, text, hash, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&chunk.meta.case_id)
            .bind(&chunk.meta.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&hash)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(chunks.len() as u64)
    }

    /// Return up to `k` chunks ranked by cosine similarity to `query`,
    /// restricted to chunks whose metadata matches every filter field.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filter: &ChunkFilter,
    ) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self
            .embedder
            .embed_query(query)
            .await
            .context("embedding search query failed")?;

        let (where_clause, binds) = filter_sql(filter);
        let sql = format!(
            "SELECT rowid, case_id, document_id, text, embedding FROM chunk_vectors{} ORDER BY rowid",
            where_clause
        );

        let mut q = sqlx::query(&sql);
        for bind in &binds {
            q = q.bind(bind);
        }
        let rows = q.fetch_all(&self.pool).await?;

        struct Candidate {
            rowid: i64,
            scored: ScoredChunk,
        }

        let mut candidates: Vec<Candidate> = rows
            .into_iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let score = cosine_similarity(&query_vec, &blob_to_vec(&blob)) as f64;
                Candidate {
                    rowid: row.get("rowid"),
                    scored: ScoredChunk {
                        text: row.get("text"),
                        score,
                        meta: ChunkMeta {
                            case_id: row.get("case_id"),
                            document_id: row.get("document_id"),
                        },
                    },
                }
            })
            .collect();

        // Stable ordering: score descending, insertion rowid ascending.
        candidates.sort_by(|a, b| {
            b.scored
                .score
                .partial_cmp(&a.scored.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.rowid.cmp(&b.rowid))
        });
        candidates.truncate(k);

        Ok(candidates.into_iter().map(|c| c.scored).collect())
    }

    /// Delete every chunk whose metadata matches all filter fields.
    ///
    /// Returns the number of chunks removed; deleting with a filter that
    /// matches nothing is a no-op, not an error.
    pub async fn delete(&self, filter: &ChunkFilter) -> Result<u64> {
        let (where_clause, binds) = filter_sql(filter);
        let sql = format!("DELETE FROM chunk_vectors{}", where_clause);

        let mut q = sqlx::query(&sql);
        for bind in &binds {
            q = q.bind(bind);
        }
        let result = q.execute(&self.pool).await?;

        Ok(result.rows_affected())
    }

    /// Number of stored chunks matching the filter.
    pub async fn count(&self, filter: &ChunkFilter) -> Result<u64> {
        let (where_clause, binds) = filter_sql(filter);
        let sql = format!("SELECT COUNT(*) FROM chunk_vectors{}", where_clause);

        let mut q = sqlx::query_scalar::<_, i64>(&sql);
        for bind in &binds {
            q = q.bind(bind);
        }
        let n = q.fetch_one(&self.pool).await?;
        Ok(n as u64)
    }
}

fn filter_sql(filter: &ChunkFilter) -> (String, Vec<String>) {
    let mut conditions = Vec::new();
    let mut binds = Vec::new();

    if let Some(case_id) = &filter.case_id {
        conditions.push("case_id = ?");
        binds.push(case_id.clone());
    }
    if let Some(document_id) = &filter.document_id {
        conditions.push("document_id = ?");
        binds.push(document_id.clone());
    }

    if conditions.is_empty() {
        (String::new(), binds)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), binds)
    }
}
