//! Qdrant-backed [`VectorIndex`] over the REST API.
//!
//! Points are stored with the payload layout
//! `{"page_content": text, "metadata": {filename, policy_type, uploaded_at}}`
//! so collections written by other tools that follow the same convention
//! stay readable. Metadata filters address `metadata.<field>`.
//!
//! Embedding happens inside [`insert`](VectorIndex::insert) and
//! [`similarity_search`](VectorIndex::similarity_search) through the
//! injected [`Embedder`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use policy_assistant_core::embedding::Embedder;
use policy_assistant_core::error::{RagError, RagResult};
use policy_assistant_core::models::{ChunkMetadata, PolicyChunk, StoredChunk};
use policy_assistant_core::store::{MetadataField, VectorIndex};

use crate::config::VectorStoreConfig;

/// Page size for scroll requests.
const SCROLL_PAGE: usize = 256;

/// Errors raised while talking to Qdrant.
#[derive(Debug, Error)]
pub enum QdrantError {
    #[error("connection to {url} failed: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{operation} returned HTTP {status}: {body}")]
    Status {
        operation: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("{operation} returned an unexpected body: {reason}")]
    Decode {
        operation: &'static str,
        reason: String,
    },
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    id: Value,
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    payload: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ScrollPage {
    points: Vec<ScoredPoint>,
    #[serde(default)]
    next_page_offset: Option<Value>,
}

/// Vector index stored in a Qdrant collection.
pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    api_key: Option<String>,
    embedder: Arc<dyn Embedder>,
}

impl QdrantIndex {
    /// Build a client for `config.collection`. Reads the optional
    /// `QDRANT_API_KEY` from the environment.
    pub fn new(config: &VectorStoreConfig, embedder: Arc<dyn Embedder>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            api_key: std::env::var("QDRANT_API_KEY").ok().filter(|k| !k.is_empty()),
            embedder,
        })
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, suffix)
    }

    async fn send(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, QdrantError> {
        let request = match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        };
        let resp = request.send().await.map_err(|source| QdrantError::Connection {
            url: self.base_url.clone(),
            source,
        })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(QdrantError::Status {
                operation,
                status,
                body,
            });
        }
        Ok(resp)
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, QdrantError> {
        let resp = self.send(operation, request).await?;
        let envelope: Envelope<T> = resp.json().await.map_err(|e| QdrantError::Decode {
            operation,
            reason: e.to_string(),
        })?;
        Ok(envelope.result)
    }

    /// Create the collection with cosine distance and the embedder's
    /// dimension unless it already exists.
    pub async fn ensure_collection(&self) -> anyhow::Result<()> {
        let url = self.collection_url("");
        let request = self.client.get(&url);
        let request = match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        };
        let resp = request.send().await.map_err(|source| QdrantError::Connection {
            url: self.base_url.clone(),
            source,
        })?;

        if resp.status().is_success() {
            tracing::debug!(collection = %self.collection, "collection exists");
            return Ok(());
        }
        if resp.status() != reqwest::StatusCode::NOT_FOUND {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(QdrantError::Status {
                operation: "get collection",
                status,
                body,
            }
            .into());
        }

        let body = json!({
            "vectors": { "size": self.embedder.dims(), "distance": "Cosine" }
        });
        self.send("create collection", self.client.put(&url).json(&body))
            .await?;
        tracing::info!(
            collection = %self.collection,
            dims = self.embedder.dims(),
            "created Qdrant collection"
        );
        Ok(())
    }

    /// Collect every point id matching `filter` (or all points when `None`).
    async fn scroll_ids(&self, filter: Option<Value>) -> Result<Vec<Value>, QdrantError> {
        let mut ids = Vec::new();
        let mut offset: Option<Value> = None;
        loop {
            let mut body = json!({
                "limit": SCROLL_PAGE,
                "with_payload": false,
                "with_vector": false,
            });
            if let Some(f) = &filter {
                body["filter"] = f.clone();
            }
            if let Some(o) = offset.take() {
                body["offset"] = o;
            }
            let page: ScrollPage = self
                .send_json(
                    "scroll",
                    self.client
                        .post(self.collection_url("/points/scroll"))
                        .json(&body),
                )
                .await?;
            ids.extend(page.points.into_iter().map(|p| p.id));
            match page.next_page_offset {
                Some(next) if !next.is_null() => offset = Some(next),
                _ => break,
            }
        }
        Ok(ids)
    }

    async fn delete_ids(&self, ids: Vec<Value>) -> Result<usize, QdrantError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let count = ids.len();
        self.send(
            "delete points",
            self.client
                .post(self.collection_url("/points/delete?wait=true"))
                .json(&json!({ "points": ids })),
        )
        .await?;
        Ok(count)
    }
}

fn field_filter(field: MetadataField, value: &str) -> Value {
    json!({
        "must": [
            { "key": format!("metadata.{}", field.as_str()), "match": { "value": value } }
        ]
    })
}

fn point_payload(chunk: &PolicyChunk) -> Value {
    json!({
        "page_content": chunk.text,
        "metadata": chunk.metadata,
    })
}

fn id_to_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Convert a returned point into a [`StoredChunk`]. Missing metadata fields
/// read back as empty strings.
fn point_to_chunk(point: ScoredPoint) -> StoredChunk {
    let payload = point.payload.unwrap_or(Value::Null);
    let text = payload
        .get("page_content")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let meta = payload.get("metadata").cloned().unwrap_or(Value::Null);
    let field = |name: &str| {
        meta.get(name)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };
    StoredChunk {
        id: id_to_string(&point.id),
        text,
        metadata: ChunkMetadata {
            filename: field("filename"),
            policy_type: field("policy_type"),
            uploaded_at: field("uploaded_at"),
        },
        score: point.score,
    }
}

/// Pair each chunk with its vector as an upsert point with a fresh id.
fn build_points(chunks: &[PolicyChunk], vectors: Vec<Vec<f32>>) -> RagResult<Vec<Value>> {
    if vectors.len() != chunks.len() {
        return Err(RagError::IndexWrite(format!(
            "embedder returned {} vectors for {} chunks",
            vectors.len(),
            chunks.len()
        )));
    }
    Ok(chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| {
            json!({
                "id": uuid::Uuid::new_v4().to_string(),
                "vector": vector,
                "payload": point_payload(chunk),
            })
        })
        .collect())
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn insert(&self, chunks: &[PolicyChunk]) -> RagResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        let points = build_points(chunks, vectors)?;

        self.send(
            "upsert points",
            self.client
                .put(self.collection_url("/points?wait=true"))
                .json(&json!({ "points": points })),
        )
        .await
        .map_err(|e| RagError::IndexWrite(e.to_string()))?;
        Ok(())
    }

    async fn similarity_search(&self, query: &str, k: usize) -> RagResult<Vec<StoredChunk>> {
        let vector = self.embedder.embed_one(query).await?;
        let body = json!({
            "vector": vector,
            "limit": k,
            "with_payload": true,
        });
        let points: Vec<ScoredPoint> = self
            .send_json(
                "search",
                self.client
                    .post(self.collection_url("/points/search"))
                    .json(&body),
            )
            .await
            .map_err(|e| RagError::IndexRead(e.to_string()))?;
        Ok(points.into_iter().map(point_to_chunk).collect())
    }

    async fn delete_by_filter(&self, field: MetadataField, value: &str) -> RagResult<usize> {
        let ids = self
            .scroll_ids(Some(field_filter(field, value)))
            .await
            .map_err(|e| RagError::IndexRead(e.to_string()))?;
        self.delete_ids(ids)
            .await
            .map_err(|e| RagError::IndexWrite(e.to_string()))
    }

    async fn delete_all(&self) -> RagResult<usize> {
        let ids = self
            .scroll_ids(None)
            .await
            .map_err(|e| RagError::IndexRead(e.to_string()))?;
        self.delete_ids(ids)
            .await
            .map_err(|e| RagError::IndexWrite(e.to_string()))
    }

    async fn list_all(&self, limit: usize) -> RagResult<Vec<StoredChunk>> {
        let mut chunks = Vec::new();
        let mut offset: Option<Value> = None;
        while chunks.len() < limit {
            let mut body = json!({
                "limit": SCROLL_PAGE.min(limit - chunks.len()),
                "with_payload": true,
                "with_vector": false,
            });
            if let Some(o) = offset.take() {
                body["offset"] = o;
            }
            let page: ScrollPage = self
                .send_json(
                    "scroll",
                    self.client
                        .post(self.collection_url("/points/scroll"))
                        .json(&body),
                )
                .await
                .map_err(|e| RagError::IndexRead(e.to_string()))?;
            chunks.extend(page.points.into_iter().map(point_to_chunk));
            match page.next_page_offset {
                Some(next) if !next.is_null() => offset = Some(next),
                _ => break,
            }
        }
        chunks.truncate(limit);
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_payload_layout() {
        let chunk = PolicyChunk {
            text: "Employees accrue leave monthly.".into(),
            metadata: ChunkMetadata::new("leave.pdf", "HR", Utc::now()),
        };
        let payload = point_payload(&chunk);
        assert_eq!(payload["page_content"], "Employees accrue leave monthly.");
        assert_eq!(payload["metadata"]["filename"], "leave.pdf");
        assert_eq!(payload["metadata"]["policy_type"], "HR");
        assert!(payload["metadata"]["uploaded_at"].is_string());
    }

    #[test]
    fn test_points_require_one_vector_per_chunk() {
        let chunks: Vec<PolicyChunk> = ["a", "b", "c"]
            .iter()
            .map(|text| PolicyChunk {
                text: text.to_string(),
                metadata: ChunkMetadata::new("leave.pdf", "HR", Utc::now()),
            })
            .collect();

        let err = build_points(&chunks, vec![vec![0.1, 0.2]; 2]).unwrap_err();
        assert!(matches!(err, RagError::IndexWrite(_)));
        assert!(err.to_string().contains("2 vectors for 3 chunks"));

        let points = build_points(&chunks, vec![vec![0.1, 0.2]; 3]).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[2]["payload"]["page_content"], "c");
        assert_ne!(points[0]["id"], points[1]["id"]);
    }

    #[test]
    fn test_filter_targets_nested_metadata() {
        let filter = field_filter(MetadataField::Filename, "leave.pdf");
        assert_eq!(filter["must"][0]["key"], "metadata.filename");
        assert_eq!(filter["must"][0]["match"]["value"], "leave.pdf");
    }

    #[test]
    fn test_point_to_chunk_reads_payload() {
        let point: ScoredPoint = serde_json::from_value(json!({
            "id": 42,
            "score": 0.9,
            "payload": {
                "page_content": "text",
                "metadata": { "filename": "it.pdf", "policy_type": "IT", "uploaded_at": "2024-01-01T00:00:00Z" }
            }
        }))
        .unwrap();
        let chunk = point_to_chunk(point);
        assert_eq!(chunk.id, "42");
        assert_eq!(chunk.text, "text");
        assert_eq!(chunk.metadata.policy_type, "IT");
        assert_eq!(chunk.score, Some(0.9));
    }

    #[test]
    fn test_point_without_metadata_reads_empty_fields() {
        let point: ScoredPoint = serde_json::from_value(json!({
            "id": "b1c6a2e0-0000-0000-0000-000000000000",
            "payload": { "page_content": "orphan" }
        }))
        .unwrap();
        let chunk = point_to_chunk(point);
        assert_eq!(chunk.id, "b1c6a2e0-0000-0000-0000-000000000000");
        assert_eq!(chunk.metadata.filename, "");
        assert!(chunk.score.is_none());
    }
}
