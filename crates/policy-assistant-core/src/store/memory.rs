//! In-memory [`VectorIndex`] implementation for tests and local runs.
//!
//! Stores chunks and their vectors in a `Vec` behind `std::sync::RwLock`.
//! Similarity search is brute-force cosine similarity over all stored
//! vectors, embedding the query with the injected [`Embedder`].

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{RagError, RagResult};
use crate::models::{PolicyChunk, StoredChunk};

use super::{MetadataField, VectorIndex};

struct StoredVector {
    id: String,
    chunk: PolicyChunk,
    vector: Vec<f32>,
}

/// In-memory vector index.
pub struct InMemoryIndex {
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Vec<StoredVector>>,
}

impl InMemoryIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> RagError {
    RagError::IndexWrite("in-memory index lock poisoned".to_string())
}

fn field_value<'a>(chunk: &'a PolicyChunk, field: MetadataField) -> &'a str {
    match field {
        MetadataField::Filename => &chunk.metadata.filename,
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn insert(&self, chunks: &[PolicyChunk]) -> RagResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(RagError::IndexWrite(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        for (chunk, vector) in chunks.iter().zip(vectors) {
            entries.push(StoredVector {
                id: Uuid::new_v4().to_string(),
                chunk: chunk.clone(),
                vector,
            });
        }
        Ok(())
    }

    async fn similarity_search(&self, query: &str, k: usize) -> RagResult<Vec<StoredChunk>> {
        let query_vec = self.embedder.embed_one(query).await?;
        let entries = self
            .entries
            .read()
            .map_err(|_| RagError::IndexRead("in-memory index lock poisoned".to_string()))?;

        let mut scored: Vec<StoredChunk> = entries
            .iter()
            .map(|e| StoredChunk {
                id: e.id.clone(),
                text: e.chunk.text.clone(),
                metadata: e.chunk.metadata.clone(),
                score: Some(cosine_similarity(&query_vec, &e.vector)),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn delete_by_filter(&self, field: MetadataField, value: &str) -> RagResult<usize> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let before = entries.len();
        entries.retain(|e| field_value(&e.chunk, field) != value);
        Ok(before - entries.len())
    }

    async fn delete_all(&self) -> RagResult<usize> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let count = entries.len();
        entries.clear();
        Ok(count)
    }

    async fn list_all(&self, limit: usize) -> RagResult<Vec<StoredChunk>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| RagError::IndexRead("in-memory index lock poisoned".to_string()))?;
        Ok(entries
            .iter()
            .take(limit)
            .map(|e| StoredChunk {
                id: e.id.clone(),
                text: e.chunk.text.clone(),
                metadata: e.chunk.metadata.clone(),
                score: None,
            })
            .collect())
    }
}
