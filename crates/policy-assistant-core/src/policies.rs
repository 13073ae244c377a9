//! Policy listing derived from indexed chunks.
//!
//! There is no separate policy registry: listings are a best-effort
//! projection over whatever chunks the index returns, grouped by
//! `(filename, policy_type)` in first-seen order.

use std::collections::HashMap;

use crate::models::{PolicySummary, StoredChunk};

/// Characters assumed per page when estimating page counts.
const CHARS_PER_PAGE: usize = 3000;

pub fn summarize_policies(chunks: &[StoredChunk]) -> Vec<PolicySummary> {
    let mut order: Vec<(String, String)> = Vec::new();
    let mut totals: HashMap<(String, String), (String, usize, usize)> = HashMap::new();

    for chunk in chunks {
        let key = (
            chunk.metadata.filename.clone(),
            chunk.metadata.policy_type.clone(),
        );
        let entry = totals.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            (chunk.metadata.uploaded_at.clone(), 0, 0)
        });
        entry.1 += chunk.text.chars().count();
        entry.2 += 1;
    }

    order
        .into_iter()
        .filter_map(|key| {
            let (uploaded_at, chars, count) = totals.remove(&key)?;
            Some(PolicySummary {
                name: key.0,
                policy_type: key.1,
                uploaded_at,
                pages: chars.div_ceil(CHARS_PER_PAGE).max(1),
                size: chars as f64 / 1024.0,
                chunks: count,
            })
        })
        .collect()
}
