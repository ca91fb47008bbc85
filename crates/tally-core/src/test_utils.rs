//! Test utilities for tally-core
//!
//! A mock model server speaking both the OpenAI chat completions API and the
//! Ollama generate API, so the real HTTP backends can be exercised end to end.
//! Replies are the same canned per-kind JSON the in-process `MockBackend`
//! returns.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::oneshot;

use crate::ai::mock::canned_reply;
use crate::ai::MockReply;

/// How the mock server answers generation requests
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMode {
    /// Canned JSON chosen from the prompt
    Canned,
    /// Always answer with this text
    Fixed(String),
    /// Always answer 429
    RateLimited,
    /// Always answer 500
    Failing,
    /// Wait this long before answering with canned JSON
    Slow(Duration),
}

#[derive(Clone)]
struct ServerState {
    mode: Arc<Mutex<ServerMode>>,
    requests: Arc<AtomicUsize>,
    max_tokens_seen: Arc<Mutex<Vec<u32>>>,
}

impl ServerState {
    fn mode(&self) -> ServerMode {
        self.mode
            .lock()
            .map(|m| m.clone())
            .unwrap_or(ServerMode::Canned)
    }
}

/// Mock model server for testing and development
pub struct MockModelServer {
    addr: SocketAddr,
    state: ServerState,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockModelServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        Self::start_with_mode(ServerMode::Canned).await
    }

    pub async fn start_with_mode(mode: ServerMode) -> Self {
        let state = ServerState {
            mode: Arc::new(Mutex::new(mode)),
            requests: Arc::new(AtomicUsize::new(0)),
            max_tokens_seen: Arc::new(Mutex::new(Vec::new())),
        };

        let app = Router::new()
            .route("/v1/models", get(handle_models))
            .route("/v1/chat/completions", post(handle_chat))
            .route("/api/tags", get(handle_tags))
            .route("/api/generate", post(handle_generate))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Change how later requests are answered
    pub fn set_mode(&self, mode: ServerMode) {
        if let Ok(mut current) = self.state.mode.lock() {
            *current = mode;
        }
    }

    /// Generation requests received so far
    pub fn request_count(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    /// Output token limits received, in request order
    pub fn max_tokens_seen(&self) -> Vec<u32> {
        self.state
            .max_tokens_seen
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockModelServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Produce reply text for `prompt`, or an error response
async fn reply_for(state: &ServerState, prompt: &str, max_tokens: u32) -> Result<String, Response> {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if let Ok(mut seen) = state.max_tokens_seen.lock() {
        seen.push(max_tokens);
    }

    let canned = |prompt: &str| match canned_reply(prompt) {
        MockReply::Text(text) => Ok(text),
        _ => Err((StatusCode::INTERNAL_SERVER_ERROR, "no canned reply").into_response()),
    };

    match state.mode() {
        ServerMode::Canned => canned(prompt),
        ServerMode::Fixed(text) => Ok(text),
        ServerMode::RateLimited => Err((
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": {"message": "Rate limit exceeded"}})),
        )
            .into_response()),
        ServerMode::Failing => {
            Err((StatusCode::INTERNAL_SERVER_ERROR, "upstream unavailable").into_response())
        }
        ServerMode::Slow(delay) => {
            tokio::time::sleep(delay).await;
            canned(prompt)
        }
    }
}

async fn handle_models() -> Json<serde_json::Value> {
    Json(json!({
        "object": "list",
        "data": [{"id": "mock-model", "object": "model"}]
    }))
}

/// OpenAI chat completions endpoint
async fn handle_chat(
    State(state): State<ServerState>,
    Json(request): Json<ChatRequest>,
) -> Response {
    let prompt = request
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    match reply_for(&state, &prompt, request.max_tokens.unwrap_or(0)).await {
        Ok(content) => Json(json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion",
            "model": request.model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        }))
        .into_response(),
        Err(response) => response,
    }
}

/// Ollama tags endpoint (health check)
async fn handle_tags() -> Json<serde_json::Value> {
    Json(json!({"models": [{"name": "llama3.2:latest"}]}))
}

/// Ollama generate endpoint
async fn handle_generate(
    State(state): State<ServerState>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    let num_predict = request.options.map(|o| o.num_predict).unwrap_or(0);
    match reply_for(&state, &request.prompt, num_predict).await {
        Ok(response) => Json(GenerateResponse {
            model: request.model,
            response,
            done: true,
        })
        .into_response(),
        Err(response) => response,
    }
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    options: Option<GenerateOptions>,
}

#[derive(Debug, Deserialize)]
struct GenerateOptions {
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    model: String,
    response: String,
    done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{ModelBackend, OllamaBackend, OpenAICompatibleBackend};
    use crate::error::Error;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_openai_backend_against_mock_server() {
        let server = MockModelServer::start().await;
        let backend = OpenAICompatibleBackend::with_api_key(&server.url(), "mock-model", "sk-test");

        assert!(backend.health_check().await);
        let reply = backend
            .generate("\"suggestedCategory\"", 500, CancellationToken::new())
            .await
            .unwrap();
        assert!(reply.contains("suggestedCategory"));
        assert_eq!(server.request_count(), 1);
        assert_eq!(server.max_tokens_seen(), vec![500]);
    }

    #[tokio::test]
    async fn test_ollama_backend_against_mock_server() {
        let server = MockModelServer::start().await;
        let backend = OllamaBackend::new(&server.url(), "llama3.2");

        assert!(backend.health_check().await);
        let reply = backend
            .generate("\"anomalies\"", 1500, CancellationToken::new())
            .await
            .unwrap();
        assert!(reply.contains("anomalies"));
        assert_eq!(server.max_tokens_seen(), vec![1500]);
    }

    #[tokio::test]
    async fn test_429_maps_to_rate_limited() {
        let server = MockModelServer::start_with_mode(ServerMode::RateLimited).await;
        let backend = OpenAICompatibleBackend::new(&server.url(), "mock-model");

        let err = backend
            .generate("\"topSpending\"", 100, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimited(_)));
        assert!(err.is_rate_limit());
    }

    #[tokio::test]
    async fn test_server_error_maps_to_backend() {
        let server = MockModelServer::start_with_mode(ServerMode::Failing).await;
        let backend = OllamaBackend::new(&server.url(), "llama3.2");

        let err = backend
            .generate("\"topSpending\"", 100, CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            Error::Backend(message) => assert!(message.contains("500")),
            other => panic!("expected Backend error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_abandons_slow_request() {
        let server = MockModelServer::start_with_mode(ServerMode::Slow(Duration::from_secs(30))).await;
        let backend = OpenAICompatibleBackend::new(&server.url(), "mock-model");

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = backend
            .generate("\"topSpending\"", 100, cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_set_mode() {
        let server = MockModelServer::start().await;
        server.set_mode(ServerMode::Fixed("not json".into()));
        let backend = OpenAICompatibleBackend::new(&server.url(), "mock-model");

        let reply = backend
            .generate("anything", 100, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply, "not json");
    }
}
