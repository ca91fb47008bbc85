//! Tally Core Library
//!
//! AI insight pipeline for the Tally personal finance tool:
//! - Model backends (OpenRouter / OpenAI-compatible, Ollama, mock)
//! - Invocation control: per-attempt timeout, retry with backoff
//! - Response sanitizing and schema validation
//! - Financial aggregation over monthly transaction data
//! - Insight pipeline with concurrent fan-out and persistence
//! - SQLite storage for transactions, categories and insights

pub mod ai;
pub mod config;
pub mod db;
pub mod error;
pub mod insights;
pub mod models;
pub mod prompts;
pub mod stats;
pub mod store;

/// Test utilities including a mock OpenAI-compatible server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{
    AIClient, MockBackend, ModelBackend, OllamaBackend, OpenAICompatibleBackend, RetryPolicy,
};
pub use config::PipelineConfig;
pub use db::Database;
pub use error::{Error, Result};
pub use insights::{
    AnalysisOutcome, AnalysisRequest, FanOutReport, Insight, InsightKind, InsightPipeline,
    SavingsGoal,
};
pub use models::{Category, TransactionFact, TransactionKind, YearMonth};
pub use prompts::{Prompt, PromptId, PromptLibrary};
pub use stats::MonthlyStats;
pub use store::InsightStore;
