//! HTTP server.
//!
//! Thin axum plumbing over the ingestion pipeline, the conversation engine
//! and policy administration.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload-policy` | Multipart `file` + `policy_type`; index a PDF |
//! | `POST` | `/chat` | Form `query` + `session_id`; one chat turn |
//! | `GET`  | `/policies` | Distinct indexed policies |
//! | `DELETE` | `/policies/clear-all` | Remove every indexed chunk |
//! | `DELETE` | `/policies/{name}` | Remove the chunks of one document |
//! | `GET`  | `/health` | Health check (status, version, log level) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "index-write", "message": "vector index write failed: ..." } }
//! ```
//!
//! Request validation failures use `bad_request` (400). Pipeline and chat
//! failures use the stage label of the step that failed as the code:
//! `load` and `split` are 422, upstream service failures (`embedding`,
//! `index-write`, `index-read`, `decision`, `retrieval`, `generation`) are
//! 502, anything else is 500.
//!
//! # CORS
//!
//! Only the origins listed in `[server] allowed_origins` are permitted. A
//! `"*"` entry allows any origin.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{rejection::FormRejection, DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use policy_assistant_core::chat::ChatModel;
use policy_assistant_core::error::RagError;
use policy_assistant_core::models::PolicySummary;
use policy_assistant_core::session::{InMemorySessionStore, SessionStore};
use policy_assistant_core::store::memory::InMemoryIndex;
use policy_assistant_core::store::VectorIndex;

use crate::admin::{self, DeleteOutcome};
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::engine::ConversationEngine;
use crate::ingest::IngestPipeline;
use crate::llm::OpenAIChatModel;
use crate::loader::is_pdf_name;
use crate::qdrant::QdrantIndex;

/// Shared services handed to every route handler and CLI command.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub index: Arc<dyn VectorIndex>,
    pub pipeline: Arc<IngestPipeline>,
    pub engine: Arc<ConversationEngine>,
}

impl AppState {
    /// Wire services from explicit parts. Used by tests and custom binaries.
    pub fn new(
        config: Config,
        index: Arc<dyn VectorIndex>,
        model: Arc<dyn ChatModel>,
        sessions: Arc<dyn SessionStore>,
    ) -> anyhow::Result<Self> {
        let pipeline = IngestPipeline::from_config(&config, index.clone())?;
        let engine = ConversationEngine::from_config(&config, model, index.clone(), sessions);
        Ok(Self {
            config: Arc::new(config),
            index,
            pipeline: Arc::new(pipeline),
            engine: Arc::new(engine),
        })
    }

    /// Build the configured vector store, chat model and session store.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let index = build_index(config).await?;
        let model: Arc<dyn ChatModel> = Arc::new(OpenAIChatModel::new(&config.llm)?);
        let sessions: Arc<dyn SessionStore> =
            Arc::new(InMemorySessionStore::new(config.sessions.limits()));

        Self::new(config.clone(), index, model, sessions)
    }
}

/// Build the configured embedder and vector store. Creates the Qdrant
/// collection if it is missing.
pub async fn build_index(config: &Config) -> anyhow::Result<Arc<dyn VectorIndex>> {
    let embedder = create_embedder(&config.embedding)?;
    tracing::info!(
        provider = %config.embedding.provider,
        model = embedder.model_name(),
        "initialized embeddings"
    );

    let index: Arc<dyn VectorIndex> = match config.vector_store.provider.as_str() {
        "qdrant" => {
            let qdrant = QdrantIndex::new(&config.vector_store, embedder)?;
            qdrant.ensure_collection().await.with_context(|| {
                format!(
                    "Failed to prepare Qdrant collection '{}' at {}",
                    config.vector_store.collection, config.vector_store.url
                )
            })?;
            Arc::new(qdrant)
        }
        "memory" => Arc::new(InMemoryIndex::new(embedder)),
        other => anyhow::bail!("Unknown vector store provider: {}", other),
    };
    tracing::info!(provider = %config.vector_store.provider, "initialized vector store");
    Ok(index)
}

/// Build the router with CORS and the upload body limit applied.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.allowed_origins);
    let body_limit = state.config.server.max_upload_mb.saturating_mul(1024 * 1024);

    Router::new()
        .route("/upload-policy", post(handle_upload))
        .route("/chat", post(handle_chat))
        .route("/policies", get(handle_list_policies))
        .route("/policies/clear-all", delete(handle_clear_all))
        .route("/policies/{name}", delete(handle_delete_policy))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(parsed))
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let bind_addr = config.server.bind.clone();

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!("policy assistant listening on http://{}", bind_addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let status = match &err {
            RagError::Load(_) | RagError::Split(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RagError::Embedding(_)
            | RagError::IndexWrite(_)
            | RagError::IndexRead(_)
            | RagError::Gate(_)
            | RagError::Retrieval(_)
            | RagError::Generation(_) => StatusCode::BAD_GATEWAY,
            RagError::Session(_) | RagError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!(stage = err.stage(), error = %err, "request failed");
        AppError {
            status,
            code: err.stage().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ POST /upload-policy ============

#[derive(Serialize)]
struct UploadResponse {
    message: String,
    chunks: usize,
}

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut policy_type: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| bad_request("file field has no file name"))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;
                file = Some((file_name, bytes.to_vec()));
            }
            Some("policy_type") => {
                policy_type = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| bad_request(format!("invalid policy_type: {}", e)))?,
                );
            }
            _ => {}
        }
    }

    let (filename, bytes) = file.ok_or_else(|| bad_request("missing file field"))?;
    let policy_type = policy_type
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| bad_request("missing policy_type field"))?;
    if !is_pdf_name(&filename) {
        return Err(bad_request("Only PDF files are allowed"));
    }

    tracing::info!(filename = %filename, policy_type = %policy_type, "uploading policy document");

    // Removed when `tmp` drops, on success and on every error path.
    let tmp = tempfile::Builder::new()
        .prefix("policy-upload-")
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| RagError::Load(format!("cannot create temporary file: {}", e)))?;
    tokio::fs::write(tmp.path(), &bytes)
        .await
        .map_err(|e| RagError::Load(format!("cannot write temporary file: {}", e)))?;

    let report = state
        .pipeline
        .ingest_file(tmp.path(), &filename, &policy_type)
        .await?;

    Ok(Json(UploadResponse {
        message: format!("{} uploaded and indexed successfully.", report.policy_type),
        chunks: report.chunks,
    }))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatForm {
    query: String,
    session_id: String,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    history: Vec<(String, String)>,
}

async fn handle_chat(
    State(state): State<AppState>,
    form: Result<Form<ChatForm>, FormRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Form(form) = form.map_err(|rejection| bad_request(rejection.body_text()))?;
    if form.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if form.session_id.is_empty() {
        return Err(bad_request("session_id must not be empty"));
    }

    let turn = state.engine.chat(&form.session_id, &form.query).await?;
    Ok(Json(ChatResponse {
        response: turn.answer,
        history: turn
            .history
            .into_iter()
            .map(|t| (t.user, t.assistant))
            .collect(),
    }))
}

// ============ /policies ============

#[derive(Serialize)]
struct PolicyListResponse {
    policies: Vec<PolicySummary>,
}

async fn handle_list_policies(
    State(state): State<AppState>,
) -> Result<Json<PolicyListResponse>, AppError> {
    let policies =
        admin::list_policies(state.index.as_ref(), state.config.retrieval.listing_limit).await?;
    Ok(Json(PolicyListResponse { policies }))
}

#[derive(Serialize)]
struct DeleteResponse {
    message: String,
    deleted: usize,
}

async fn handle_delete_policy(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let outcome = admin::delete_policy(state.index.as_ref(), &name).await?;
    let message = match outcome {
        DeleteOutcome::Deleted(n) => {
            format!("Successfully deleted {} documents for policy '{}'", n, name)
        }
        DeleteOutcome::NotFound => format!("No documents found with filename: {}", name),
    };
    Ok(Json(DeleteResponse {
        message,
        deleted: outcome.deleted(),
    }))
}

async fn handle_clear_all(State(state): State<AppState>) -> Result<Json<DeleteResponse>, AppError> {
    let outcome = admin::clear_all(state.index.as_ref()).await?;
    let message = match outcome {
        DeleteOutcome::Deleted(n) => {
            format!("Successfully deleted {} documents from vector store", n)
        }
        DeleteOutcome::NotFound => "No documents found in vector store".to_string(),
    };
    Ok(Json(DeleteResponse {
        message,
        deleted: outcome.deleted(),
    }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    log_level: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        log_level: state.config.logging.level.clone(),
    })
}
