//! HTTP interface
//!
//! Maps the four UI events onto the orchestrator:
//!
//! - POST /api/documents - Process uploaded files (text, or base64 for PDFs)
//! - POST /api/sessions/:id/query - Submit a query
//! - POST /api/sessions/:id/regenerate - Regenerate the last response
//! - DELETE /api/sessions/:id - Clear a conversation
//! - GET /api/sessions/:id/history - Read a conversation
//! - GET /api/status - Get server status

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use sdk::errors::EngineError;
use sdk::types::{ConversationEntry, RawDocument};

use crate::config::ServerConfig;
use crate::orchestrator::QueryOrchestrator;

/// State shared across handlers
#[derive(Clone)]
pub struct ServerState {
    orchestrator: Arc<QueryOrchestrator>,
}

impl ServerState {
    pub fn new(orchestrator: Arc<QueryOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ContentEncoding {
    #[default]
    Text,
    Base64,
}

#[derive(Debug, Deserialize)]
struct UploadedDocument {
    name: String,
    content: String,
    #[serde(default)]
    encoding: ContentEncoding,
}

impl UploadedDocument {
    fn into_raw(self) -> Result<RawDocument, String> {
        let bytes = match self.encoding {
            ContentEncoding::Text => self.content.into_bytes(),
            ContentEncoding::Base64 => STANDARD
                .decode(self.content.trim())
                .map_err(|e| format!("Document '{}' is not valid base64: {}", self.name, e))?,
        };
        Ok(RawDocument::new(self.name, bytes))
    }
}

#[derive(Debug, Deserialize)]
struct IngestRequest {
    documents: Vec<UploadedDocument>,
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    query: String,
}

#[derive(Debug, Default, Deserialize)]
struct RegenerateRequest {
    #[serde(default)]
    query: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnswerResponse {
    answer: String,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    session: String,
    entries: Vec<ConversationEntry>,
}

/// Build the router (also used directly by tests)
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/documents", post(ingest_handler))
        .route("/api/sessions/:id", delete(clear_handler))
        .route("/api/sessions/:id/query", post(query_handler))
        .route("/api/sessions/:id/regenerate", post(regenerate_handler))
        .route("/api/sessions/:id/history", get(history_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `server.host:server.port` and serve until Ctrl-C
pub async fn serve(orchestrator: Arc<QueryOrchestrator>, config: &ServerConfig) -> Result<(), EngineError> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| EngineError::Config(format!("Invalid server address: {}", e)))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| EngineError::Network(format!("Failed to bind to {}: {}", addr, e)))?;

    tracing::info!("Abacus listening on http://{}", addr);

    axum::serve(listener, router(ServerState::new(orchestrator)))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Server shutting down gracefully");
        })
        .await
        .map_err(|e| EngineError::Network(format!("Server error: {}", e)))
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

async fn status_handler(State(state): State<ServerState>) -> Json<serde_json::Value> {
    let sessions = state.orchestrator.session_count().await;
    Json(json!({
        "status": "running",
        "sessions": sessions,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn ingest_handler(
    State(state): State<ServerState>,
    Json(payload): Json<IngestRequest>,
) -> Result<Json<serde_json::Value>, Response> {
    if payload.documents.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "No documents were uploaded"));
    }

    let documents = payload
        .documents
        .into_iter()
        .map(UploadedDocument::into_raw)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|message| error_response(StatusCode::BAD_REQUEST, message))?;

    let report = state.orchestrator.ingest(documents).await;
    Ok(Json(json!({
        "success_count": report.success_count,
        "failure_count": report.failure_count,
        "chunk_count": report.chunk_count,
        "message": report.message(),
    })))
}

async fn query_handler(
    State(state): State<ServerState>,
    Path(session): Path<String>,
    Json(payload): Json<QueryRequest>,
) -> Json<AnswerResponse> {
    let answer = state.orchestrator.process_query(&session, &payload.query).await;
    Json(AnswerResponse { answer })
}

async fn regenerate_handler(
    State(state): State<ServerState>,
    Path(session): Path<String>,
    payload: Option<Json<RegenerateRequest>>,
) -> Result<Json<AnswerResponse>, Response> {
    let requested = payload
        .and_then(|Json(body)| body.query)
        .filter(|q| !q.trim().is_empty());

    let query = match requested {
        Some(query) => query,
        None => state
            .orchestrator
            .last_user_message(&session)
            .await
            .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "No previous query to regenerate"))?,
    };

    let answer = state.orchestrator.regenerate(&session, &query).await;
    Ok(Json(AnswerResponse { answer }))
}

async fn clear_handler(State(state): State<ServerState>, Path(session): Path<String>) -> StatusCode {
    state.orchestrator.clear(&session).await;
    StatusCode::NO_CONTENT
}

async fn history_handler(
    State(state): State<ServerState>,
    Path(session): Path<String>,
) -> Json<HistoryResponse> {
    let entries = state.orchestrator.history(&session).await;
    Json(HistoryResponse { session, entries })
}
