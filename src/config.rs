//! TOML configuration parsing and validation.
//!
//! Every section is optional and falls back to the defaults below. Secrets
//! are never read from the file: `OPENAI_API_KEY` and `QDRANT_API_KEY` come
//! from the environment.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use policy_assistant_core::session::SessionLimits;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Upload body limit in MiB.
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            allowed_origins: default_allowed_origins(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_max_upload_mb() -> usize {
    50
}
fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    policy_assistant_core::chunk::DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    policy_assistant_core::chunk::DEFAULT_CHUNK_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Chunks per index insertion call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Trailing turns surfaced to the model.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    /// Maximum chunks scanned when deriving the policy listing.
    #[serde(default = "default_listing_limit")]
    pub listing_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            history_turns: default_history_turns(),
            listing_limit: default_listing_limit(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_history_turns() -> usize {
    5
}
fn default_listing_limit() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Base URL for the Ollama provider.
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            url: default_ollama_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_dims() -> usize {
    768
}
fn default_ollama_url() -> String {
    "http://127.0.0.1:11434".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorStoreConfig {
    #[serde(default = "default_vector_provider")]
    pub provider: String,
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            provider: default_vector_provider(),
            url: default_qdrant_url(),
            collection: default_collection(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl VectorStoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_vector_provider() -> String {
    "qdrant".to_string()
}
fn default_qdrant_url() -> String {
    "http://127.0.0.1:6333".to_string()
}
fn default_collection() -> String {
    "policies".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            base_url: default_llm_base_url(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionsConfig {
    /// Idle seconds before a session is forgotten. `0` keeps sessions forever.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Maximum retained sessions. `0` means unbounded.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl SessionsConfig {
    pub fn limits(&self) -> SessionLimits {
        SessionLimits {
            ttl: (self.ttl_secs > 0).then(|| ttl_duration(self.ttl_secs)).flatten(),
            max_sessions: (self.max_sessions > 0).then_some(self.max_sessions),
        }
    }
}

/// `None` when the value does not fit a chrono duration.
fn ttl_duration(secs: u64) -> Option<chrono::Duration> {
    i64::try_from(secs).ok().and_then(chrono::Duration::try_seconds)
}

fn default_ttl_secs() -> u64 {
    86_400
}
fn default_max_sessions() -> usize {
    10_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load and validate a config file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
        let config = Config::default();
        validate(&config)?;
        return Ok(config);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }
    if config.ingest.batch_size == 0 {
        anyhow::bail!("ingest.batch_size must be > 0");
    }
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.sessions.ttl_secs > 0 && ttl_duration(config.sessions.ttl_secs).is_none() {
        anyhow::bail!(
            "sessions.ttl_secs ({}) is too large; use 0 to keep sessions forever",
            config.sessions.ttl_secs
        );
    }

    match config.embedding.provider.as_str() {
        "ollama" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be ollama or openai.",
            other
        ),
    }

    match config.vector_store.provider.as_str() {
        "qdrant" | "memory" => {}
        other => anyhow::bail!(
            "Unknown vector store provider: '{}'. Must be qdrant or memory.",
            other
        ),
    }

    Ok(())
}
