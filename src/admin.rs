//! Policy administration over the vector index: listing, delete by
//! filename, clear all.

use policy_assistant_core::error::RagResult;
use policy_assistant_core::models::PolicySummary;
use policy_assistant_core::policies::summarize_policies;
use policy_assistant_core::store::{MetadataField, VectorIndex};

/// Outcome of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted(usize),
    /// Nothing matched. Not an error.
    NotFound,
}

impl DeleteOutcome {
    fn from_count(count: usize) -> Self {
        if count == 0 {
            DeleteOutcome::NotFound
        } else {
            DeleteOutcome::Deleted(count)
        }
    }

    pub fn deleted(&self) -> usize {
        match self {
            DeleteOutcome::Deleted(n) => *n,
            DeleteOutcome::NotFound => 0,
        }
    }
}

/// Distinct `(filename, policy_type)` entries over at most `limit` chunks.
pub async fn list_policies(index: &dyn VectorIndex, limit: usize) -> RagResult<Vec<PolicySummary>> {
    let chunks = index.list_all(limit).await?;
    let policies = summarize_policies(&chunks);
    tracing::info!(chunks = chunks.len(), policies = policies.len(), "listed policies");
    Ok(policies)
}

/// Delete every chunk carrying `filename`.
pub async fn delete_policy(index: &dyn VectorIndex, filename: &str) -> RagResult<DeleteOutcome> {
    let outcome = DeleteOutcome::from_count(
        index
            .delete_by_filter(MetadataField::Filename, filename)
            .await?,
    );
    match outcome {
        DeleteOutcome::Deleted(n) => tracing::info!(filename, deleted = n, "deleted policy"),
        DeleteOutcome::NotFound => tracing::warn!(filename, "no documents found with filename"),
    }
    Ok(outcome)
}

/// Delete every chunk in the index.
pub async fn clear_all(index: &dyn VectorIndex) -> RagResult<DeleteOutcome> {
    let outcome = DeleteOutcome::from_count(index.delete_all().await?);
    match outcome {
        DeleteOutcome::Deleted(n) => tracing::info!(deleted = n, "cleared all policies"),
        DeleteOutcome::NotFound => tracing::info!("no documents found in vector store"),
    }
    Ok(outcome)
}
