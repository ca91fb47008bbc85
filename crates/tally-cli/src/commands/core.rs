//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` / `build_pipeline` - Shared setup for the other commands
//! - `cmd_init` - Initialize the database
//! - `cmd_health` - Check the AI backend

use std::path::Path;

use anyhow::{bail, Context, Result};
use tally_core::ai::{AIClient, ModelBackend};
use tally_core::db::Database;
use tally_core::error::Error;
use tally_core::insights::InsightPipeline;
use tally_core::models::YearMonth;
use tally_core::{PipelineConfig, PromptLibrary};

/// Pipeline as wired up by the CLI
pub type CliPipeline = InsightPipeline<Database, AIClient>;

pub fn open_db(db_path: &Path) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    Database::new(path_str).context("Failed to open database")
}

/// `--config` if given, else the data dir override, else built-in defaults
pub fn load_config(config_path: Option<&Path>) -> Result<PipelineConfig> {
    match config_path {
        Some(path) => PipelineConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => PipelineConfig::load().context("Failed to load pipeline config"),
    }
}

/// AI client from the environment, with setup hints when none is configured
pub fn ai_client() -> Result<AIClient> {
    match AIClient::from_env() {
        Some(client) => Ok(client),
        None => {
            println!("💡 Tip: Set OPENROUTER_API_KEY to use OpenRouter");
            println!("💡 Tip: Or set AI_BACKEND=ollama and OLLAMA_HOST for a local model");
            bail!("No AI backend configured")
        }
    }
}

pub fn build_pipeline(db_path: &Path, config_path: Option<&Path>) -> Result<CliPipeline> {
    let db = open_db(db_path)?;
    let config = load_config(config_path)?;
    let prompts = PromptLibrary::new().context("Failed to load prompts")?;
    let client = ai_client()?;

    tracing::debug!(
        backend = client.backend_name(),
        model = client.model(),
        "AI backend selected"
    );

    Ok(InsightPipeline::new(config, db, client, prompts))
}

/// Parse `YYYY-MM`, defaulting to the current month
pub fn parse_month(month: Option<&str>) -> Result<YearMonth> {
    match month {
        Some(m) => m.parse().with_context(|| format!("Invalid month '{}'", m)),
        None => Ok(YearMonth::current()),
    }
}

/// One-line, user-facing description of an analysis failure
pub fn describe_error(error: &Error) -> String {
    match error {
        Error::NoData(reason) => format!("Nothing to analyze: {}", reason),
        e if e.is_rate_limit() => "AI rate limit exceeded. Please try again later.".to_string(),
        Error::InvocationExhausted { attempts, source } => {
            format!("AI service failed after {} attempts: {}", attempts, source)
        }
        Error::ResponseParse(e) => format!("AI returned an unusable response ({})", e.reason),
        other => other.to_string(),
    }
}

pub fn cmd_init(db_path: &Path) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path)?;

    let added = db
        .seed_default_categories()
        .context("Failed to seed default categories")?;
    println!("   Seeded {} default categories", added);

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Record transactions: tally add --category Food --amount 12.50");
    println!("  2. Get insights: tally overview");

    Ok(())
}

pub async fn cmd_health() -> Result<()> {
    println!("🔍 Checking AI backend...\n");

    let client = ai_client()?;
    println!("  Backend: {}", client.backend_name());
    println!("  Model:   {}", client.model());
    println!("  Host:    {}", client.host());

    if client.health_check().await {
        println!("\n✅ Connected");
        Ok(())
    } else {
        println!("\n❌ Could not reach {}", client.host());
        bail!("AI backend health check failed")
    }
}
