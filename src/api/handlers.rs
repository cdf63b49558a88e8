//! HTTP request handlers

use super::assets::{get_index_html, serve_static};
use super::sse::sse_stream;
use super::types::{
    CancelResponse, ChatRequest, ChatResponse, ErrorResponse, NewSessionResponse,
    SessionListResponse, SessionResponse,
};
use super::AppState;
use crate::presenter::UiEvent;
use crate::turn::TurnError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Root serves the chat page
        .route("/", get(serve_spa))
        // Static assets (embedded or filesystem fallback)
        .route("/assets/*path", get(serve_static))
        // Session listing
        .route("/api/sessions", get(list_sessions))
        // Session creation
        .route("/api/sessions/new", post(create_session))
        // History retrieval
        .route("/api/sessions/:id", get(get_session))
        // SSE streaming
        .route("/api/sessions/:id/stream", get(stream_session))
        // User actions
        .route("/api/sessions/:id/chat", post(send_chat))
        .route("/api/sessions/:id/cancel", post(cancel_turn))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Chat Page
// ============================================================

async fn serve_spa() -> impl IntoResponse {
    match get_index_html() {
        Some(content) => Html(content).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Html("<h1>404 - UI not found</h1>".to_string()),
        )
            .into_response(),
    }
}

// ============================================================
// Sessions
// ============================================================

async fn list_sessions(State(state): State<AppState>) -> Json<SessionListResponse> {
    let sessions = state.processor.store().list().await;
    Json(SessionListResponse { sessions })
}

/// Mint a fresh session id. Purely a convenience: any unknown id sent to
/// the other endpoints creates its session implicitly.
async fn create_session() -> Json<NewSessionResponse> {
    Json(NewSessionResponse {
        session_id: uuid::Uuid::new_v4().to_string(),
    })
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<SessionResponse> {
    let session = state.processor.store().session(&id).await;
    Json(SessionResponse {
        session_id: session.id().to_string(),
        messages: session.history().await,
        turn_in_flight: session.turn_in_flight(),
    })
}

// ============================================================
// SSE Streaming
// ============================================================

async fn stream_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    // Subscribe before snapshotting history so no event falls in between.
    let broadcast_rx = state.processor.subscribe(&id).await;
    let messages = state.processor.store().session(&id).await.history().await;

    let init_event = UiEvent::Init {
        session_id: id,
        messages,
    };

    sse_stream(init_event, broadcast_rx)
}

// ============================================================
// User Actions
// ============================================================

async fn send_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.text.trim().is_empty() {
        return Err(AppError::BadRequest("Message text is empty".to_string()));
    }

    state
        .processor
        .spawn_turn(&id, req.text)
        .await
        .map_err(|e| match e {
            TurnError::Busy => AppError::Conflict(e.to_string()),
            other => AppError::Internal(other.to_string()),
        })?;

    Ok(Json(ChatResponse { queued: true }))
}

async fn cancel_turn(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<CancelResponse> {
    let ok = state.processor.cancel_turn(&id).await;
    Json(CancelResponse { ok })
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("heron-chat ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
