//! Vector index abstraction for Policy Assistant.
//!
//! The [`VectorIndex`] trait is the repository interface consumed by the
//! ingestion pipeline and the conversation engine. Embedding is
//! encapsulated inside implementations: `insert` embeds chunk text and
//! `similarity_search` embeds the query.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::error::RagResult;
use crate::models::{PolicyChunk, StoredChunk};

/// Metadata field a delete filter can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    Filename,
}

impl MetadataField {
    /// Field name as stored in chunk metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataField::Filename => "filename",
        }
    }
}

/// Abstract vector index backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert`](VectorIndex::insert) | Embed and store a batch of chunks |
/// | [`similarity_search`](VectorIndex::similarity_search) | Top-k nearest chunks, best first |
/// | [`delete_by_filter`](VectorIndex::delete_by_filter) | Delete chunks whose metadata field equals a value |
/// | [`delete_all`](VectorIndex::delete_all) | Clear the whole collection |
/// | [`list_all`](VectorIndex::list_all) | Read back stored chunks, up to a limit |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Embed and store a batch of chunks.
    ///
    /// Fails with `IndexWrite` (or `Embedding` when the embedder fails).
    async fn insert(&self, chunks: &[PolicyChunk]) -> RagResult<()>;

    /// Return the `k` chunks most similar to `query`, best match first.
    async fn similarity_search(&self, query: &str, k: usize) -> RagResult<Vec<StoredChunk>>;

    /// Delete every chunk whose `field` equals `value`. Returns the count deleted.
    async fn delete_by_filter(&self, field: MetadataField, value: &str) -> RagResult<usize>;

    /// Delete every chunk. Returns the count deleted.
    async fn delete_all(&self) -> RagResult<usize>;

    /// Return up to `limit` stored chunks in storage order.
    async fn list_all(&self, limit: usize) -> RagResult<Vec<StoredChunk>>;
}
