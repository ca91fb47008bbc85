//! Pluggable model backend abstraction
//!
//! # Architecture
//!
//! - `ModelBackend` trait: a single text-generation call plus diagnostics
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OpenAICompatibleBackend` (OpenRouter and any
//!   `/v1/chat/completions` server), `OllamaBackend`, `MockBackend`
//! - `retry`: timeout + backoff around a backend call
//! - `parsing` / `schema`: recovering validated JSON from the reply text
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_BACKEND`: openrouter (default), openai_compatible, ollama, mock
//! - `OPENROUTER_API_KEY`: required for openrouter
//! - `OPENROUTER_MODEL`: model slug (default: anthropic/claude-haiku-4.5)
//! - `OPENAI_COMPATIBLE_HOST`: server URL (required for openai_compatible)
//! - `OPENAI_COMPATIBLE_MODEL`: model name (default: gpt-3.5-turbo)
//! - `OPENAI_COMPATIBLE_API_KEY`: API key if required (optional)
//! - `OLLAMA_HOST`: Ollama server URL (required for ollama)
//! - `OLLAMA_MODEL`: model name (default: llama3.2)

pub(crate) mod mock;
mod ollama;
mod openai_compatible;
pub mod parsing;
pub mod retry;
pub mod schema;

pub use mock::{MockBackend, MockCall, MockReply};
pub use ollama::OllamaBackend;
pub use openai_compatible::OpenAICompatibleBackend;
pub use retry::{Backoff, RecordingSleeper, RetryPolicy, Sleeper, Step, TokioSleeper};
pub use schema::{Schema, SchemaViolation, StructuredResponse};

use std::future::Future;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// A remote text-generation model
///
/// `generate` must stop work and return promptly once `cancel` fires.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Send `prompt` and return the raw reply text
    async fn generate(
        &self,
        prompt: &str,
        max_output_tokens: u32,
        cancel: CancellationToken,
    ) -> Result<String>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Model name (for logging)
    fn model(&self) -> &str;

    /// Host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete AI client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum AIClient {
    /// OpenAI-compatible chat completions (OpenRouter, vLLM, LocalAI, ...)
    OpenAICompatible(OpenAICompatibleBackend),
    /// Ollama backend (HTTP API)
    Ollama(OllamaBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AIClient {
    /// Create an AI client from environment variables
    ///
    /// Checks `AI_BACKEND` to determine which backend to use. Returns None if
    /// the required environment variables for that backend are not set.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("AI_BACKEND").unwrap_or_else(|_| "openrouter".to_string());

        match backend.to_lowercase().as_str() {
            "openrouter" => OpenAICompatibleBackend::openrouter_from_env().map(AIClient::OpenAICompatible),
            "openai_compatible" | "openai" | "vllm" | "localai" | "llamacpp" => {
                OpenAICompatibleBackend::from_env().map(AIClient::OpenAICompatible)
            }
            "ollama" => OllamaBackend::from_env().map(AIClient::Ollama),
            "mock" => Some(AIClient::Mock(MockBackend::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown AI_BACKEND, falling back to openrouter");
                OpenAICompatibleBackend::openrouter_from_env().map(AIClient::OpenAICompatible)
            }
        }
    }

    /// Create an Ollama backend directly
    pub fn ollama(host: &str, model: &str) -> Self {
        AIClient::Ollama(OllamaBackend::new(host, model))
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }

    /// Name of the active backend
    pub fn backend_name(&self) -> &'static str {
        match self {
            AIClient::OpenAICompatible(_) => "openai_compatible",
            AIClient::Ollama(_) => "ollama",
            AIClient::Mock(_) => "mock",
        }
    }
}

#[async_trait]
impl ModelBackend for AIClient {
    async fn generate(
        &self,
        prompt: &str,
        max_output_tokens: u32,
        cancel: CancellationToken,
    ) -> Result<String> {
        match self {
            AIClient::OpenAICompatible(b) => b.generate(prompt, max_output_tokens, cancel).await,
            AIClient::Ollama(b) => b.generate(prompt, max_output_tokens, cancel).await,
            AIClient::Mock(b) => b.generate(prompt, max_output_tokens, cancel).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::OpenAICompatible(b) => b.health_check().await,
            AIClient::Ollama(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::Ollama(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.host(),
            AIClient::Ollama(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}

/// Race `request` against `cancel`; the request future is dropped on cancel
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    request: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = request => result,
    }
}

/// Map a non-success HTTP response to an error, 429 becoming `RateLimited`
async fn check_status(response: reqwest::Response, api: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(Error::RateLimited(format!("{} {}: {}", api, status, body)));
    }
    Err(Error::Backend(format!("{} error {}: {}", api, status, body)))
}
