//! Multi-session HTTP server.
//!
//! Each client creates a session and then drives it through ingestion,
//! questions and resets. Sessions are independent: each sits behind its own
//! lock, so operations within a session run one at a time while different
//! sessions proceed concurrently.
//!
//! Live sessions are capped at `[server].max_sessions`, and a background
//! sweep drops sessions left idle for `[server].session_idle_secs`. Request
//! bodies have no size limit.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `GET`    | `/models` | Supported generation models |
//! | `POST`   | `/sessions` | Create a session from optional settings |
//! | `GET`    | `/sessions/{id}` | Settings (token redacted), index state, history |
//! | `PUT`    | `/sessions/{id}/settings` | Update settings |
//! | `POST`   | `/sessions/{id}/documents` | Upload files and rebuild the index |
//! | `POST`   | `/sessions/{id}/ask` | Ask a question |
//! | `POST`   | `/sessions/{id}/reset` | Clear the conversation |
//! | `DELETE` | `/sessions/{id}` | Drop the session |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "no_index", "message": "no documents have been indexed yet; ..." } }
//! ```
//!
//! Missing input and invalid settings answer `400` with the error's own
//! code; failures of the extraction, embedding or generation services
//! answer `502`. Unknown sessions are `404 not_found`; creating a session
//! while the cap is reached is `503 too_many_sessions`.

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::config::{Config, ServerConfig};
use crate::error::RagError;
use crate::models::{ConversationTurn, UploadedFile};
use crate::progress::NoProgress;
use crate::prompt::source_excerpt;
use crate::services::Services;
use crate::session::{IngestReport, Session, SessionStatus};
use crate::settings::{RagSettings, SettingsInput, SUPPORTED_MODELS};

/// A session plus the time a request last touched it.
struct Slot {
    session: Session,
    last_used: Instant,
}

type SessionMap = HashMap<Uuid, Arc<Mutex<Slot>>>;

/// Bounds on how many sessions the server keeps and for how long.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub max_sessions: usize,
    pub idle_timeout: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for SessionLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_sessions: config.max_sessions,
            idle_timeout: Duration::from_secs(config.session_idle_secs),
        }
    }
}

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Defaults applied to every new session.
    defaults: Arc<RagSettings>,
    services: Services,
    limits: SessionLimits,
    sessions: Arc<RwLock<SessionMap>>,
}

impl AppState {
    pub fn new(defaults: RagSettings, services: Services) -> Self {
        Self {
            defaults: Arc::new(defaults),
            services,
            limits: SessionLimits::default(),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_limits(mut self, limits: SessionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Lock a session for the duration of one request and mark it used.
    async fn session(&self, id: Uuid) -> Result<OwnedMutexGuard<Slot>, AppError> {
        let slot = self
            .sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(format!("no session with id: {}", id)))?;
        let mut slot = slot.lock_owned().await;
        slot.last_used = Instant::now();
        Ok(slot)
    }

    /// Drop sessions idle for longer than the timeout. Sessions serving a
    /// request right now are kept. Returns how many were dropped.
    pub async fn prune_idle(&self) -> usize {
        let timeout = self.limits.idle_timeout;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, slot| match slot.try_lock() {
            Ok(slot) => slot.last_used.elapsed() < timeout,
            Err(_) => true,
        });
        let dropped = before - sessions.len();
        if dropped > 0 {
            tracing::info!(dropped, live = sessions.len(), "idle sessions dropped");
        }
        dropped
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Build the router. Exposed so the routes can be mounted or tested
/// without binding a socket.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/models", get(handle_models))
        .route("/sessions", post(handle_create_session))
        .route(
            "/sessions/{id}",
            get(handle_get_session).delete(handle_delete_session),
        )
        .route("/sessions/{id}/settings", put(handle_update_settings))
        .route("/sessions/{id}/documents", post(handle_upload))
        .route("/sessions/{id}/ask", post(handle_ask))
        .route("/sessions/{id}/reset", post(handle_reset))
        .layer(DefaultBodyLimit::disable())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until the process
/// is terminated.
pub async fn run_server(config: &Config, defaults: RagSettings) -> anyhow::Result<()> {
    let services = Services::from_config(config, defaults.token().map(str::to_string))?;
    let limits = SessionLimits::from(&config.server);
    let state = AppState::new(defaults, services).with_limits(limits);

    let sweeper = state.clone();
    let every = limits.idle_timeout.clamp(Duration::from_secs(1), Duration::from_secs(60));
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        loop {
            tick.tick().await;
            sweeper.prune_idle().await;
        }
    });

    let app = router(state);

    let bind_addr = &config.server.bind;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(bind = %bind_addr, "server listening");
    println!("rag-chat server listening on http://{}", bind_addr);
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

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
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

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let status = if err.is_precondition() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::BAD_GATEWAY
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn too_many_sessions(max: usize) -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "too_many_sessions".to_string(),
        message: format!("session limit of {} reached; delete a session and retry", max),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn parse_id(id: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(id).map_err(|_| not_found(format!("no session with id: {}", id)))
}

// ============ GET /health, GET /models ============

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

#[derive(Serialize)]
struct ModelsResponse {
    models: Vec<String>,
    default: String,
}

async fn handle_models() -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: SUPPORTED_MODELS.iter().map(|m| m.to_string()).collect(),
        default: SUPPORTED_MODELS[0].to_string(),
    })
}

// ============ Sessions ============

#[derive(Serialize)]
struct SessionView {
    id: Uuid,
    #[serde(flatten)]
    status: SessionStatus,
    history: Vec<ConversationTurn>,
}

fn view(id: Uuid, session: &Session) -> SessionView {
    SessionView {
        id,
        status: session.status(),
        history: session.history().to_vec(),
    }
}

/// `POST /sessions`: the optional body holds settings (including the
/// token); unset fields fall back to the server defaults.
async fn handle_create_session(
    State(state): State<AppState>,
    input: Option<Json<SettingsInput>>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    let input = input.map(|Json(input)| input).unwrap_or_default();
    let settings = state.defaults.with_overrides(input)?;
    let id = Uuid::new_v4();
    let session = Session::new(settings);
    let body = view(id, &session);

    state.prune_idle().await;
    let mut sessions = state.sessions.write().await;
    if sessions.len() >= state.limits.max_sessions {
        tracing::warn!(live = sessions.len(), "session limit reached");
        return Err(too_many_sessions(state.limits.max_sessions));
    }
    sessions.insert(
        id,
        Arc::new(Mutex::new(Slot {
            session,
            last_used: Instant::now(),
        })),
    );
    tracing::info!(session = %id, live = sessions.len(), "session created");
    Ok((StatusCode::CREATED, Json(body)))
}

async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let id = parse_id(&id)?;
    let slot = state.session(id).await?;
    Ok(Json(view(id, &slot.session)))
}

async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    state
        .sessions
        .write()
        .await
        .remove(&id)
        .ok_or_else(|| not_found(format!("no session with id: {}", id)))?;
    tracing::info!(session = %id, "session deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_update_settings(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<SettingsInput>,
) -> Result<Json<RagSettings>, AppError> {
    let id = parse_id(&id)?;
    let mut slot = state.session(id).await?;
    let settings = slot.session.update_settings(input)?.clone();
    Ok(Json(settings))
}

async fn handle_reset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let id = parse_id(&id)?;
    let mut slot = state.session(id).await?;
    slot.session.reset();
    Ok(Json(view(id, &slot.session)))
}

// ============ POST /sessions/{id}/documents ============

#[derive(Deserialize)]
struct UploadRequest {
    files: Vec<UploadPayload>,
}

#[derive(Deserialize)]
struct UploadPayload {
    name: String,
    /// Base64-encoded file bytes.
    content: String,
}

fn decode_uploads(files: Vec<UploadPayload>) -> Result<Vec<UploadedFile>, AppError> {
    files
        .into_iter()
        .map(|f| {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(f.content.trim())
                .map_err(|e| bad_request(format!("{}: content is not valid base64: {}", f.name, e)))?;
            Ok(UploadedFile::new(f.name, bytes))
        })
        .collect()
}

async fn handle_upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<IngestReport>, AppError> {
    let id = parse_id(&id)?;
    let files = decode_uploads(req.files)?;
    let mut slot = state.session(id).await?;
    let report = slot
        .session
        .ingest(
            files,
            state.services.embedder.as_ref(),
            state.services.batch_size,
            &NoProgress,
        )
        .await?;
    Ok(Json(report))
}

// ============ POST /sessions/{id}/ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

#[derive(Serialize)]
struct SourceView {
    source: String,
    page: Option<u32>,
    score: f32,
    excerpt: String,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    sources: Vec<SourceView>,
}

async fn handle_ask(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let id = parse_id(&id)?;
    let mut slot = state.session(id).await?;
    let answer = slot
        .session
        .ask(
            &req.question,
            state.services.embedder.as_ref(),
            state.services.generator.as_ref(),
            &NoProgress,
        )
        .await?;

    let sources = answer
        .sources
        .iter()
        .map(|s| SourceView {
            source: s.chunk.source.clone(),
            page: s.chunk.page,
            score: s.score,
            excerpt: source_excerpt(&s.chunk),
        })
        .collect();
    Ok(Json(AskResponse {
        answer: answer.text,
        sources,
    }))
}
