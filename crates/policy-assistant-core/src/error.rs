//! Error taxonomy for ingestion and conversation.
//!
//! Every failure crossing an external boundary (PDF parser, embedding
//! provider, vector index, language model) is surfaced as one of these
//! kinds with a descriptive message. Timeouts are reported under the kind
//! of the call that timed out.

use thiserror::Error;

/// Result type alias using [`RagError`].
pub type RagResult<T> = std::result::Result<T, RagError>;

#[derive(Debug, Error)]
pub enum RagError {
    /// The source document could not be read or is not a valid PDF.
    #[error("failed to load document: {0}")]
    Load(String),

    /// Loaded text produced no indexable chunks.
    #[error("failed to split document: {0}")]
    Split(String),

    /// The embedding provider was unreachable or returned an invalid response.
    #[error("embedding provider error: {0}")]
    Embedding(String),

    /// The vector index rejected or failed a write.
    #[error("vector index write failed: {0}")]
    IndexWrite(String),

    /// The vector index rejected or failed a read.
    #[error("vector index read failed: {0}")]
    IndexRead(String),

    /// The retrieval decision call failed.
    #[error("retrieval decision failed: {0}")]
    Gate(String),

    /// Context retrieval for a chat turn failed.
    #[error("context retrieval failed: {0}")]
    Retrieval(String),

    /// The answer generation call failed.
    #[error("answer generation failed: {0}")]
    Generation(String),

    /// The session store could not read or record history.
    #[error("session store error: {0}")]
    Session(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl RagError {
    /// Short label of the stage that failed, for user-visible reports.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Load(_) => "load",
            Self::Split(_) => "split",
            Self::Embedding(_) => "embedding",
            Self::IndexWrite(_) => "index-write",
            Self::IndexRead(_) => "index-read",
            Self::Gate(_) => "decision",
            Self::Retrieval(_) => "retrieval",
            Self::Generation(_) => "generation",
            Self::Session(_) => "session",
            Self::Config(_) => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_labels() {
        assert_eq!(RagError::Load("x".into()).stage(), "load");
        assert_eq!(RagError::Split("x".into()).stage(), "split");
        assert_eq!(RagError::IndexWrite("x".into()).stage(), "index-write");
    }

    #[test]
    fn test_display_includes_message() {
        let err = RagError::Generation("timed out after 60s".into());
        assert_eq!(
            err.to_string(),
            "answer generation failed: timed out after 60s"
        );
    }
}
