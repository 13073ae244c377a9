//! Embedding provider trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that all embedding backends implement.
//! Vector indexes hold an `Arc<dyn Embedder>` and call it inside their
//! insert and search operations, so callers never orchestrate embedding
//! as a separate step.
//!
//! Concrete providers (Ollama, OpenAI) live in the `policy-assistant` app
//! crate.

use async_trait::async_trait;

use crate::error::{RagError, RagResult};

/// Trait for embedding providers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in order.
    ///
    /// Failures are reported as [`RagError::Embedding`].
    async fn embed(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_one(&self, text: &str) -> RagResult<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("empty embedding response".to_string()))
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors or vectors
/// of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
