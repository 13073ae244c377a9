//! Embedding provider implementations.
//!
//! Concrete [`Embedder`] backends:
//! - **[`OllamaEmbedder`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`OpenAIEmbedder`]**: calls the OpenAI `/v1/embeddings` endpoint.
//!
//! Each call is bounded by the configured timeout. There is no automatic
//! retry: a failed call surfaces as [`RagError::Embedding`] and the caller
//! decides what to do.
//!
//! # Provider Selection
//!
//! Use [`create_embedder`] to instantiate the provider named in the
//! `[embedding]` config section:
//!
//! ```rust,no_run
//! # use policy_assistant::config::EmbeddingConfig;
//! # use policy_assistant::embedding::create_embedder;
//! # use policy_assistant_core::embedding::Embedder;
//! let config = EmbeddingConfig::default(); // provider = "ollama"
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "nomic-embed-text");
//! ```

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use policy_assistant_core::embedding::Embedder;
use policy_assistant_core::error::{RagError, RagResult};

use crate::config::EmbeddingConfig;

/// Build the embedder named by `config.provider`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

fn http_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(config.timeout())
        .build()?)
}

/// Read a JSON body or turn a non-success status into an embedding error.
async fn read_json(provider: &str, resp: reqwest::Response) -> RagResult<serde_json::Value> {
    let status = resp.status();
    if !status.is_success() {
        let body_text = resp.text().await.unwrap_or_default();
        return Err(RagError::Embedding(format!(
            "{} API error {}: {}",
            provider, status, body_text
        )));
    }
    resp.json()
        .await
        .map_err(|e| RagError::Embedding(format!("{} returned invalid JSON: {}", provider, e)))
}

fn check_count(provider: &str, vectors: &[Vec<f32>], expected: usize) -> RagResult<()> {
    if vectors.len() != expected {
        return Err(RagError::Embedding(format!(
            "{} returned {} embeddings for {} inputs",
            provider,
            vectors.len(),
            expected
        )));
    }
    Ok(())
}

fn json_to_vector(value: &serde_json::Value) -> Option<Vec<f32>> {
    value
        .as_array()
        .map(|arr| arr.iter().map(|v| v.as_f64().unwrap_or(0.0) as f32).collect())
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default:
/// `http://127.0.0.1:11434`). Requires an embedding model to be pulled
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    dims: usize,
    url: String,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            model: config.model.clone(),
            dims: config.dims,
            url: config.url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let resp = self
            .client
            .post(format!("{}/api/embed", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                RagError::Embedding(format!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url, e
                ))
            })?;

        let json = read_json("Ollama", resp).await?;
        let vectors = parse_ollama_response(&json)?;
        check_count("Ollama", &vectors, texts.len())?;
        Ok(vectors)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> RagResult<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            RagError::Embedding("Invalid Ollama response: missing embeddings array".to_string())
        })?;

    embeddings
        .iter()
        .map(|e| {
            json_to_vector(e).ok_or_else(|| {
                RagError::Embedding("Invalid Ollama response: embedding is not an array".to_string())
            })
        })
        .collect()
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Requires the `OPENAI_API_KEY` environment variable to be set.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    model: String,
    dims: usize,
    api_key: String,
}

impl OpenAIEmbedder {
    /// # Errors
    ///
    /// Returns an error if `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            client: http_client(config)?,
            model: config.model.clone(),
            dims: config.dims,
            api_key,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let resp = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("OpenAI request failed: {}", e)))?;

        let json = read_json("OpenAI", resp).await?;
        let vectors = parse_openai_response(&json)?;
        check_count("OpenAI", &vectors, texts.len())?;
        Ok(vectors)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> RagResult<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| {
            RagError::Embedding("Invalid OpenAI response: missing data array".to_string())
        })?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let vector = item.get("embedding").and_then(json_to_vector).ok_or_else(|| {
            RagError::Embedding("Invalid OpenAI response: missing embedding".to_string())
        })?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        indexed.push((index, vector));
    }
    indexed.sort_by_key(|(index, _)| *index);

    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}
