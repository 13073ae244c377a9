//! Ingestion pipeline orchestration.
//!
//! Coordinates the upload flow: PDF load → split → re-stamp metadata →
//! batched index insertion. Batches are written strictly in order; the
//! first failed batch aborts the rest. Chunks already written by earlier
//! batches stay in the index.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use policy_assistant_core::chunk::RecursiveSplitter;
use policy_assistant_core::error::{RagError, RagResult};
use policy_assistant_core::models::{LoadedPage, PolicyChunk};
use policy_assistant_core::store::VectorIndex;

use crate::config::Config;
use crate::loader;

/// Summary of one completed ingestion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub filename: String,
    pub policy_type: String,
    pub pages: usize,
    pub chunks: usize,
    pub batches: usize,
    /// Timestamp shared by every chunk written in this call.
    pub uploaded_at: String,
}

pub struct IngestPipeline {
    splitter: RecursiveSplitter,
    index: Arc<dyn VectorIndex>,
    batch_size: usize,
    call_timeout: Option<Duration>,
}

impl IngestPipeline {
    pub fn new(splitter: RecursiveSplitter, index: Arc<dyn VectorIndex>, batch_size: usize) -> Self {
        Self {
            splitter,
            index,
            batch_size: batch_size.max(1),
            call_timeout: None,
        }
    }

    /// Build a pipeline from the `[chunking]` and `[ingest]` sections. Each
    /// batch insert is bounded by the vector store timeout.
    pub fn from_config(config: &Config, index: Arc<dyn VectorIndex>) -> RagResult<Self> {
        let splitter =
            RecursiveSplitter::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
        Ok(Self::new(splitter, index, config.ingest.batch_size)
            .with_call_timeout(config.vector_store.timeout()))
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Load, split and index a PDF stored at `path` under the declared
    /// document name `filename`.
    pub async fn ingest_file(
        &self,
        path: &Path,
        filename: &str,
        policy_type: &str,
    ) -> RagResult<IngestReport> {
        let pages = loader::load_pdf(path, filename, policy_type).await?;
        self.ingest_pages(filename, &pages).await
    }

    /// Same as [`ingest_file`](Self::ingest_file) for in-memory bytes.
    pub async fn ingest_bytes(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        policy_type: &str,
    ) -> RagResult<IngestReport> {
        let pages = loader::load_pdf_bytes(bytes, filename, policy_type).await?;
        self.ingest_pages(filename, &pages).await
    }

    /// Split already-loaded pages and write them in batches.
    pub async fn ingest_pages(&self, filename: &str, pages: &[LoadedPage]) -> RagResult<IngestReport> {
        let Some(first) = pages.first() else {
            return Err(RagError::Load(format!("{}: document has no pages", filename)));
        };
        let policy_type = first.metadata.policy_type.clone();
        let uploaded_at = first.metadata.uploaded_at.clone();

        let mut chunks = self.splitter.split_pages(pages);
        if chunks.is_empty() {
            return Err(RagError::Split(format!(
                "{}: no extractable text in {} page(s)",
                filename,
                pages.len()
            )));
        }
        for chunk in &mut chunks {
            chunk.metadata.filename = filename.to_string();
        }

        let batches = self.write_batches(filename, &chunks).await?;

        tracing::info!(
            filename,
            policy_type = %policy_type,
            pages = pages.len(),
            chunks = chunks.len(),
            batches,
            "indexed policy document"
        );

        Ok(IngestReport {
            filename: filename.to_string(),
            policy_type,
            pages: pages.len(),
            chunks: chunks.len(),
            batches,
            uploaded_at,
        })
    }

    async fn write_batches(&self, filename: &str, chunks: &[PolicyChunk]) -> RagResult<usize> {
        let total = chunks.len().div_ceil(self.batch_size);
        for (i, batch) in chunks.chunks(self.batch_size).enumerate() {
            tracing::debug!(filename, batch = i + 1, total, size = batch.len(), "inserting batch");
            self.insert_batch(batch).await.map_err(|e| {
                tracing::error!(filename, batch = i + 1, total, error = %e, "batch insert failed");
                RagError::IndexWrite(format!("batch {}/{} for {}: {}", i + 1, total, filename, e))
            })?;
        }
        Ok(total)
    }

    async fn insert_batch(&self, batch: &[PolicyChunk]) -> RagResult<()> {
        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, self.index.insert(batch))
                .await
                .map_err(|_| RagError::IndexWrite(format!("insert timed out after {:?}", limit)))?,
            None => self.index.insert(batch).await,
        }
    }
}
