//! Case-scoped retrieval over the vector store.
//!
//! Chat always retrieves through [`Retriever::retrieve`], which pins the
//! case-id filter. Answers grounded in another case's documents would be a
//! cross-case information leak, so the unscoped variant is a separate,
//! deliberately named method that no chat path calls.

use anyhow::Result;
use std::sync::Arc;

use crate::vector_store::{ChunkFilter, ScoredChunk, VectorStore};

pub struct Retriever {
    store: Arc<VectorStore>,
}

impl Retriever {
    pub fn new(store: Arc<VectorStore>) -> Self {
        Self { store }
    }

    /// Top-k chunks for `query`, restricted to the given case.
    pub async fn retrieve(&self, case_id: &str, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        self.store
            .search(query, k, &ChunkFilter::for_case(case_id))
            .await
    }

    /// Top-k chunks across ALL cases.
    ///
    /// Administrative/debug use only. Never call this from case chat: the
    /// results may contain other cases' documents.
    pub async fn retrieve_unscoped(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        self.store.search(query, k, &ChunkFilter::default()).await
    }
}
