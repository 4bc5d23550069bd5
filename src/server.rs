//! Case-management HTTP API.
//!
//! Exposes the case CRUD, document upload, chat, voice, and strategy
//! endpoints over JSON. Request bodies are explicit serde structs validated
//! before reaching the core; nothing downstream sees untyped payloads.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Health check (returns version) |
//! | `POST` | `/api/cases` | Create a case |
//! | `GET` | `/api/cases` | List cases |
//! | `GET` | `/api/cases/{id}` | Case detail with documents and messages |
//! | `DELETE` | `/api/cases/{id}` | Cascading deletion (vectors, documents, messages) |
//! | `POST` | `/api/cases/{id}/documents` | Upload a document; ingestion runs in the background |
//! | `POST` | `/api/cases/{id}/messages` | Chat turn grounded in the case's documents |
//! | `POST` | `/api/cases/{id}/voice` | Voice chat turn (speech-to-text, then chat) |
//! | `POST` | `/api/cases/{id}/strategy` | Strategy memo from case + analyses |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "Case not found" } }
//! ```
//!
//! Error codes: `bad_request` (400), `validation` (400), `not_found` (404),
//! `model_error` (502), `vector_store` (500), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser
//! clients.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use uuid::Uuid;

use crate::cases::{self, CasePurge};
use crate::chat;
use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::ingest::{IngestJob, Ingestor};
use crate::llm::{LlmClient, OpenAiClient, Transcriber};
use crate::migrate;
use crate::models::{Case, CaseMessage, Document};
use crate::retriever::Retriever;
use crate::strategy;
use crate::vector_store::VectorStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    pool: sqlx::SqlitePool,
    vectors: Arc<VectorStore>,
    retriever: Arc<Retriever>,
    llm: Arc<dyn LlmClient>,
    transcriber: Arc<dyn Transcriber>,
    ingestor: Arc<Ingestor>,
}

impl AppState {
    /// Wire up every component from configuration. The embedding provider
    /// and model clients are created once here and injected; no component
    /// reaches for a global.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::run_migrations(&pool).await?;

        std::fs::create_dir_all(&config.storage.upload_dir)?;

        let embedder: Arc<dyn embedding::EmbeddingProvider> =
            Arc::from(embedding::create_provider(&config.embedding)?);
        let openai = Arc::new(OpenAiClient::new(&config.llm)?);
        let llm: Arc<dyn LlmClient> = openai.clone();
        let transcriber: Arc<dyn Transcriber> = openai;

        let vectors = Arc::new(VectorStore::new(pool.clone(), embedder));
        let retriever = Arc::new(Retriever::new(vectors.clone()));
        let ingestor = Arc::new(Ingestor::new(
            &config,
            pool.clone(),
            vectors.clone(),
            llm.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            pool,
            vectors,
            retriever,
            llm,
            transcriber,
            ingestor,
        })
    }
}

/// Build the router and serve until the process is terminated.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState::from_config(config).await?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/api/cases", post(handle_create_case).get(handle_list_cases))
        .route("/api/cases/{id}", get(handle_case_detail))
        .route("/api/cases/{id}", delete(handle_delete_case))
        .route("/api/cases/{id}/documents", post(handle_upload_document))
        .route("/api/cases/{id}/messages", post(handle_send_message))
        .route("/api/cases/{id}/voice", post(handle_voice_message))
        .route("/api/cases/{id}/strategy", post(handle_strategy))
        .layer(cors)
        .with_state(state);

    info!("lexvault listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

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

/// Internal error type that converts into an HTTP response.
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

fn validation(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "validation".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn model_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "model_error".to_string(),
        message: message.into(),
    }
}

/// Map an internal failure to the most appropriate client-visible error,
/// keyed on the error text the core produces.
fn classify_error(err: anyhow::Error) -> AppError {
    let msg = format!("{err:#}");

    if msg.contains("embedding") || msg.contains("chunk_vectors") {
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "vector_store".to_string(),
            message: msg,
        }
    } else if msg.contains("OpenAI") || msg.contains("completion") || msg.contains("transcription")
    {
        model_error(msg)
    } else {
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal".to_string(),
            message: msg,
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Cases ============

#[derive(Deserialize)]
struct CreateCaseRequest {
    #[serde(default = "default_title")]
    title: String,
    #[serde(default = "default_category")]
    category: String,
    #[serde(default = "default_jurisdiction")]
    jurisdiction: String,
    #[serde(default)]
    amount: Option<i64>,
}

fn default_title() -> String {
    "Untitled Case".to_string()
}
fn default_category() -> String {
    "General".to_string()
}
fn default_jurisdiction() -> String {
    "IN".to_string()
}

async fn handle_create_case(
    State(state): State<AppState>,
    Json(req): Json<CreateCaseRequest>,
) -> Result<Json<Case>, AppError> {
    if req.title.trim().is_empty() {
        return Err(validation("title must not be empty"));
    }

    let case = cases::create_case(
        &state.pool,
        req.title.trim(),
        &req.category,
        &req.jurisdiction,
        req.amount,
    )
    .await
    .map_err(classify_error)?;

    Ok(Json(case))
}

async fn handle_list_cases(State(state): State<AppState>) -> Result<Json<Vec<Case>>, AppError> {
    let cases = cases::list_cases(&state.pool).await.map_err(classify_error)?;
    Ok(Json(cases))
}

/// Document as exposed by the case-detail read path. Clients poll this to
/// observe ingestion completion.
#[derive(Serialize)]
struct DocumentView {
    id: String,
    filename: String,
    status: String,
    analysis: Option<serde_json::Value>,
    created_at: i64,
}

impl From<&Document> for DocumentView {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            filename: doc.filename.clone(),
            status: if doc.is_processed() {
                "processed".to_string()
            } else {
                "processing".to_string()
            },
            analysis: doc.analysis(),
            created_at: doc.created_at,
        }
    }
}

#[derive(Serialize)]
struct CaseDetailResponse {
    #[serde(flatten)]
    case: Case,
    documents: Vec<DocumentView>,
    messages: Vec<CaseMessage>,
}

async fn handle_case_detail(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
) -> Result<Json<CaseDetailResponse>, AppError> {
    let case = cases::get_case(&state.pool, &case_id)
        .await
        .map_err(classify_error)?
        .ok_or_else(|| not_found("Case not found"))?;

    let documents = cases::list_documents(&state.pool, &case_id)
        .await
        .map_err(classify_error)?;
    let messages = cases::list_messages(&state.pool, &case_id)
        .await
        .map_err(classify_error)?;

    Ok(Json(CaseDetailResponse {
        case,
        documents: documents.iter().map(DocumentView::from).collect(),
        messages,
    }))
}

#[derive(Serialize)]
struct DeleteCaseResponse {
    deleted: bool,
    #[serde(flatten)]
    purge: CasePurge,
}

async fn handle_delete_case(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
) -> Result<Json<DeleteCaseResponse>, AppError> {
    let purge = cases::purge_case(&state.pool, &state.vectors, &case_id)
        .await
        .map_err(classify_error)?
        .ok_or_else(|| not_found("Case not found"))?;

    info!(
        %case_id,
        vectors = purge.vectors_deleted,
        documents = purge.documents_deleted,
        messages = purge.messages_deleted,
        "case purged"
    );

    Ok(Json(DeleteCaseResponse {
        deleted: true,
        purge,
    }))
}

// ============ Document upload ============

#[derive(Serialize)]
struct UploadResponse {
    doc_id: String,
    status: String,
    message: String,
}

async fn handle_upload_document(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    cases::get_case(&state.pool, &case_id)
        .await
        .map_err(classify_error)?
        .ok_or_else(|| not_found("Case not found"))?;

    let (filename, bytes) = read_file_field(&mut multipart).await?;

    let stored_name = format!("{}_{}", Uuid::new_v4(), sanitize_filename(&filename));
    let stored_path = state.config.storage.upload_dir.join(&stored_name);
    tokio::fs::write(&stored_path, &bytes)
        .await
        .map_err(|e| classify_error(e.into()))?;

    let document = cases::create_document_placeholder(
        &state.pool,
        &case_id,
        &filename,
        &stored_path.to_string_lossy(),
    )
    .await
    .map_err(classify_error)?;

    // Fire-and-forget; the client polls the case-detail path for completion.
    state.ingestor.spawn(IngestJob {
        document_id: document.id.clone(),
        case_id,
        filename,
        stored_path,
    });

    Ok(Json(UploadResponse {
        doc_id: document.id,
        status: "processing".to_string(),
        message: "File uploaded and processing started".to_string(),
    }))
}

/// Pull the first file part out of a multipart body.
async fn read_file_field(multipart: &mut Multipart) -> Result<(String, Vec<u8>), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {e}")))?
    {
        if let Some(name) = field.file_name() {
            let filename = name.to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| bad_request(format!("failed reading upload: {e}")))?;
            if bytes.is_empty() {
                return Err(validation("uploaded file is empty"));
            }
            return Ok((filename, bytes.to_vec()));
        }
    }
    Err(validation("multipart body must contain a file field"))
}

fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// ============ Chat ============

#[derive(Deserialize)]
struct SendMessageRequest {
    content: String,
}

#[derive(Serialize)]
struct ChatResponse {
    user_message: String,
    ai_response: String,
}

async fn handle_send_message(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.content.trim().is_empty() {
        return Err(validation("Message content is required"));
    }

    cases::get_case(&state.pool, &case_id)
        .await
        .map_err(classify_error)?
        .ok_or_else(|| not_found("Case not found"))?;

    let turn = run_chat_turn(&state, &case_id, req.content.trim()).await?;

    Ok(Json(ChatResponse {
        user_message: turn.user_message.content,
        ai_response: turn.ai_message.content,
    }))
}

async fn run_chat_turn(
    state: &AppState,
    case_id: &str,
    content: &str,
) -> Result<chat::ChatTurn, AppError> {
    chat::run_turn(
        &state.pool,
        &state.retriever,
        state.llm.as_ref(),
        case_id,
        content,
        state.config.retrieval.top_k,
    )
    .await
    .map_err(classify_error)
}

// ============ Voice ============

#[derive(Serialize)]
struct VoiceResponse {
    transcription: String,
    ai_response: String,
}

async fn handle_voice_message(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<VoiceResponse>, AppError> {
    cases::get_case(&state.pool, &case_id)
        .await
        .map_err(classify_error)?
        .ok_or_else(|| not_found("Case not found"))?;

    let (filename, bytes) = read_file_field(&mut multipart).await?;

    let transcription = state
        .transcriber
        .transcribe(bytes, &filename)
        .await
        .map_err(|e| model_error(format!("{e:#}")))?;

    if transcription.trim().is_empty() {
        return Err(validation("transcription produced no text"));
    }

    let turn = run_chat_turn(&state, &case_id, transcription.trim()).await?;

    Ok(Json(VoiceResponse {
        transcription: turn.user_message.content,
        ai_response: turn.ai_message.content,
    }))
}

// ============ Strategy ============

#[derive(Serialize)]
struct StrategyResponse {
    strategy: String,
}

async fn handle_strategy(
    State(state): State<AppState>,
    Path(case_id): Path<String>,
) -> Result<Json<StrategyResponse>, AppError> {
    let case = cases::get_case(&state.pool, &case_id)
        .await
        .map_err(classify_error)?
        .ok_or_else(|| not_found("Case not found"))?;

    let analyses = cases::list_analyses(&state.pool, &case_id)
        .await
        .map_err(classify_error)?;

    let strategy = strategy::generate_strategy(
        state.llm.as_ref(),
        &cases::case_summary(&case),
        &analyses,
    )
    .await
    .map_err(|e| model_error(format!("{e:#}")))?;

    Ok(Json(StrategyResponse { strategy }))
}
