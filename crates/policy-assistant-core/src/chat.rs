//! Chat-completion abstraction.
//!
//! The same [`ChatModel`] serves both the retrieval decision call and the
//! final answer generation; only the prompt content differs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Trait for chat-completion backends.
///
/// Implementations return the raw text of the first choice. Errors are
/// reported as `anyhow::Error`; callers map them to the error kind of the
/// step that issued the call.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    async fn complete(&self, system: &str, messages: &[ChatMessage]) -> anyhow::Result<String>;
}
