//! Core data models used throughout Policy Assistant.
//!
//! These types represent the pages, chunks, and conversation turns that flow
//! through the ingestion and chat pipeline.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Metadata stamped onto every indexed chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Declared name of the source document (e.g. `"leave.pdf"`).
    pub filename: String,
    /// Caller-supplied category tag (e.g. `"HR"`). Free-form.
    pub policy_type: String,
    /// ISO-8601 UTC timestamp assigned at load time.
    pub uploaded_at: String,
}

impl ChunkMetadata {
    pub fn new(
        filename: impl Into<String>,
        policy_type: impl Into<String>,
        uploaded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            filename: filename.into(),
            policy_type: policy_type.into(),
            uploaded_at: format_timestamp(uploaded_at),
        }
    }
}

/// Format a timestamp the way it is stored in chunk metadata.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// One page of text extracted from a source document.
#[derive(Debug, Clone)]
pub struct LoadedPage {
    /// Zero-based page number within the source document.
    pub page: usize,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A unit of text ready for indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A chunk as read back from the vector index.
#[derive(Debug, Clone, Serialize)]
pub struct StoredChunk {
    /// Index-assigned point ID.
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Similarity score, present only on search results.
    pub score: Option<f32>,
}

/// One completed exchange in a chat session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub user: String,
    pub assistant: String,
}

impl Turn {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }
}

/// One distinct `(filename, policy_type)` pair derived from the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicySummary {
    pub name: String,
    #[serde(rename = "type")]
    pub policy_type: String,
    pub uploaded_at: String,
    /// Rough page estimate derived from chunk content length.
    pub pages: usize,
    /// Total chunk text size in KiB.
    pub size: f64,
    pub chunks: usize,
}
