//! Integration tests for the HTTP interface
//!
//! Requests are driven through the router with `oneshot`; no socket is bound.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use abacus_engine::config::{DocumentsConfig, MemoryConfig};
use abacus_engine::documents::{DocumentError, Embedder, VectorDocumentStore};
use abacus_engine::llm::{LLMProvider, Message};
use abacus_engine::orchestrator::QueryOrchestrator;
use abacus_engine::sandbox::CodeRunner;
use abacus_engine::server::{router, ServerState};
use sdk::types::ExecutionResult;

struct EchoModel;

#[async_trait]
impl LLMProvider for EchoModel {
    fn name(&self) -> &str {
        "echo"
    }

    fn model(&self) -> &str {
        "echo"
    }

    async fn generate(&self, messages: &[Message]) -> abacus_engine::llm::Result<String> {
        let prompt = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        let question = prompt
            .split("### USER QUESTION\n")
            .nth(1)
            .and_then(|rest| rest.lines().next())
            .unwrap_or("?");
        Ok(format!("echo: {}", question))
    }
}

struct NoopRunner;

#[async_trait]
impl CodeRunner for NoopRunner {
    async fn run(&self, _code: &str) -> ExecutionResult {
        ExecutionResult::failure("sandbox disabled in tests", "")
    }
}

struct FlatEmbedder;

#[async_trait]
impl Embedder for FlatEmbedder {
    fn name(&self) -> &str {
        "flat"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DocumentError> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

async fn app() -> Router {
    let documents_config = DocumentsConfig {
        chunk_size: 1000,
        chunk_overlap: 200,
        retrieval_k: 4,
        vector_db_path: std::env::temp_dir().join("abacus-unused"),
        persistence: false,
    };
    let store = VectorDocumentStore::open(Arc::new(FlatEmbedder), &documents_config).await;
    let model: Arc<dyn LLMProvider> = Arc::new(EchoModel);
    let orchestrator = QueryOrchestrator::new(
        model.clone(),
        model,
        Arc::new(store),
        Arc::new(NoopRunner),
        MemoryConfig::default(),
    );
    router(ServerState::new(Arc::new(orchestrator)))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_status_endpoint() {
    let app = app().await;
    let (status, body) = send(&app, "GET", "/api/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");
    assert_eq!(body["sessions"], 0);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_query_and_history() {
    let app = app().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/sessions/abc/query",
        Some(json!({ "query": "who wrote the report?" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "echo: who wrote the report?");

    let (status, body) = send(&app, "GET", "/api/sessions/abc/history", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"], "abc");
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["role"], "user");
    assert_eq!(entries[1]["role"], "assistant");
}

#[tokio::test]
async fn test_regenerate_uses_last_user_message() {
    let app = app().await;

    let (status, _) = send(&app, "POST", "/api/sessions/abc/regenerate", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(&app, "POST", "/api/sessions/abc/query", Some(json!({ "query": "first question" }))).await;
    let (status, body) = send(&app, "POST", "/api/sessions/abc/regenerate", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "echo: first question");

    let (_, history) = send(&app, "GET", "/api/sessions/abc/history", None).await;
    assert_eq!(history["entries"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_clear_session() {
    let app = app().await;

    send(&app, "POST", "/api/sessions/abc/query", Some(json!({ "query": "hello" }))).await;
    let (status, _) = send(&app, "DELETE", "/api/sessions/abc", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, history) = send(&app, "GET", "/api/sessions/abc/history", None).await;
    assert!(history["entries"].as_array().unwrap().is_empty());

    let (_, status) = send(&app, "GET", "/api/status", None).await;
    assert_eq!(status["sessions"], 0);
}

#[tokio::test]
async fn test_base64_document_upload() {
    let app = app().await;

    // "alpha beta" in base64
    let (status, body) = send(
        &app,
        "POST",
        "/api/documents",
        Some(json!({ "documents": [
            { "name": "a.txt", "content": "YWxwaGEgYmV0YQ==", "encoding": "base64" }
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success_count"], 1);

    let (status, body) = send(
        &app,
        "POST",
        "/api/documents",
        Some(json!({ "documents": [
            { "name": "bad.pdf", "content": "***", "encoding": "base64" }
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("bad.pdf"));
}

#[tokio::test]
async fn test_document_upload() {
    let app = app().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/documents",
        Some(json!({ "documents": [
            { "name": "a.txt", "content": "alpha" },
            { "name": "b.txt", "content": "   " }
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success_count"], 1);
    assert_eq!(body["failure_count"], 1);
    assert!(body["message"].as_str().unwrap().contains("Processed 1 file(s)"));

    let (status, _) = send(&app, "POST", "/api/documents", Some(json!({ "documents": [] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
