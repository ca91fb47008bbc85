//! Pipeline configuration
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/tally/config/pipeline.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! An explicit path skips both layers and must exist.
//!
//! Keys missing from an override keep their built-in values.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::ai::RetryPolicy;
use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/pipeline.toml");

/// Immutable settings for an `InsightPipeline`
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Output token cap for persisted analyses
    pub max_output_tokens: u32,
    /// Output token cap for category suggestions
    pub categorize_max_output_tokens: u32,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: 1500,
            categorize_max_output_tokens: 500,
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from the default override location, else the embedded defaults
    pub fn load() -> Result<Self> {
        load_config(None)
    }

    /// Load from `path`; a missing file is an error
    pub fn load_from(path: &Path) -> Result<Self> {
        load_config(Some(path))
    }

    /// Parse a TOML document on top of the built-in defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        parse_config(content)
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tally").join("config").join("pipeline.toml"))
}

fn load_config(override_path: Option<&Path>) -> Result<PipelineConfig> {
    let content = match override_path {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            read_override(path)?
        }
        None => match default_config_path() {
            Some(path) if path.exists() => read_override(&path)?,
            _ => DEFAULT_CONFIG.to_string(),
        },
    };

    parse_config(&content)
}

fn read_override(path: &Path) -> Result<String> {
    tracing::debug!(path = %path.display(), "Loading pipeline config override");
    fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    generation: Option<RawGeneration>,
    retry: Option<RawRetry>,
}

#[derive(Debug, Deserialize)]
struct RawGeneration {
    max_output_tokens: Option<u32>,
    categorize_max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawRetry {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    timeout_secs: Option<u64>,
    rate_limit_cooldown_secs: Option<u64>,
}

fn parse_config(content: &str) -> Result<PipelineConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = PipelineConfig::default();

    if let Some(generation) = raw.generation {
        if let Some(tokens) = generation.max_output_tokens {
            config.max_output_tokens = tokens;
        }
        if let Some(tokens) = generation.categorize_max_output_tokens {
            config.categorize_max_output_tokens = tokens;
        }
    }

    if let Some(retry) = raw.retry {
        if let Some(attempts) = retry.max_attempts {
            config.retry.max_attempts = attempts;
        }
        if let Some(ms) = retry.base_delay_ms {
            config.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = retry.timeout_secs {
            config.retry.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = retry.rate_limit_cooldown_secs {
            config.retry.rate_limit_cooldown = Duration::from_secs(secs);
        }
    }

    Ok(config)
}
