//! Prompt library for the insight analyses
//!
//! Prompts are loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/tally/prompts/overrides/)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Each prompt is markdown with YAML frontmatter. Templates use `{{var}}`
//! substitution and `{{#if var}}...{{/if}}` blocks that are dropped when the
//! variable is missing or empty. The strict JSON instruction is appended by
//! [`Prompt::render_strict`], so overrides cannot lose it.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Appended to every analysis prompt
pub const JSON_INSTRUCTION: &str = "YOU MUST respond with ONLY valid JSON.
No markdown code blocks.
No preamble.
Just pure JSON.";

/// Embedded default prompts (compiled into binary)
mod defaults {
    pub const SPENDING_ANALYSIS: &str = include_str!("../../../prompts/spending_analysis.md");
    pub const BUDGET_SUGGESTION: &str = include_str!("../../../prompts/budget_suggestion.md");
    pub const CATEGORIZE_TRANSACTION: &str =
        include_str!("../../../prompts/categorize_transaction.md");
    pub const ANOMALY_DETECTION: &str = include_str!("../../../prompts/anomaly_detection.md");
    pub const SAVINGS_ADVICE: &str = include_str!("../../../prompts/savings_advice.md");
}

/// Known prompt IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    SpendingAnalysis,
    BudgetSuggestion,
    CategorizeTransaction,
    AnomalyDetection,
    SavingsAdvice,
}

impl PromptId {
    /// Get the string identifier for this prompt
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpendingAnalysis => "spending_analysis",
            Self::BudgetSuggestion => "budget_suggestion",
            Self::CategorizeTransaction => "categorize_transaction",
            Self::AnomalyDetection => "anomaly_detection",
            Self::SavingsAdvice => "savings_advice",
        }
    }

    pub fn all() -> &'static [PromptId] {
        &[
            Self::SpendingAnalysis,
            Self::BudgetSuggestion,
            Self::CategorizeTransaction,
            Self::AnomalyDetection,
            Self::SavingsAdvice,
        ]
    }

    fn default_content(&self) -> &'static str {
        match self {
            Self::SpendingAnalysis => defaults::SPENDING_ANALYSIS,
            Self::BudgetSuggestion => defaults::BUDGET_SUGGESTION,
            Self::CategorizeTransaction => defaults::CATEGORIZE_TRANSACTION,
            Self::AnomalyDetection => defaults::ANOMALY_DETECTION,
            Self::SavingsAdvice => defaults::SAVINGS_ADVICE,
        }
    }
}

/// Prompt frontmatter metadata
#[derive(Debug, Clone, Deserialize)]
pub struct PromptMetadata {
    pub id: String,
    /// Version number for tracking changes
    pub version: u32,
    #[serde(default)]
    pub description: String,
}

/// A loaded prompt with metadata and content
#[derive(Debug, Clone)]
pub struct Prompt {
    pub metadata: PromptMetadata,
    pub content: String,
    /// Path to override file (if any)
    pub override_path: Option<PathBuf>,
}

impl Prompt {
    /// Whether this came from an override file
    pub fn is_override(&self) -> bool {
        self.override_path.is_some()
    }

    /// Render the template with variables replaced
    ///
    /// Conditionals are resolved on the template before substitution, and
    /// placeholders are filled in one pass, so values are never re-scanned.
    /// Unknown placeholders are left as written.
    pub fn render(&self, vars: &HashMap<&str, String>) -> String {
        let template = remove_unmatched_conditionals(&self.content, vars);

        placeholder_re()
            .replace_all(&template, |caps: &Captures| match vars.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// Render and append the strict JSON-only instruction
    pub fn render_strict(&self, vars: &HashMap<&str, String>) -> String {
        format!("{}\n\n{}", self.render(vars).trim_end(), JSON_INSTRUCTION)
    }
}

/// All prompts, resolved once at construction
///
/// Read-only after loading so it can be shared by concurrent analyses.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    override_dir: Option<PathBuf>,
    prompts: HashMap<PromptId, Prompt>,
}

impl PromptLibrary {
    /// Load with the default override directory
    pub fn new() -> Result<Self> {
        Self::load(default_prompts_dir())
    }

    /// Load with a custom override directory
    pub fn with_override_dir(path: PathBuf) -> Result<Self> {
        Self::load(Some(path))
    }

    /// Embedded prompts only
    pub fn embedded_only() -> Result<Self> {
        Self::load(None)
    }

    fn load(override_dir: Option<PathBuf>) -> Result<Self> {
        let mut prompts = HashMap::new();
        for &id in PromptId::all() {
            prompts.insert(id, load_prompt(override_dir.as_ref(), id)?);
        }
        Ok(Self {
            override_dir,
            prompts,
        })
    }

    /// Get a prompt by ID
    pub fn get(&self, id: PromptId) -> Result<&Prompt> {
        self.prompts
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("prompt {}", id.as_str())))
    }

    /// Get the override directory path
    pub fn override_dir(&self) -> Option<&PathBuf> {
        self.override_dir.as_ref()
    }
}

fn load_prompt(override_dir: Option<&PathBuf>, id: PromptId) -> Result<Prompt> {
    if let Some(dir) = override_dir {
        let override_path = dir.join(format!("{}.md", id.as_str()));
        if override_path.exists() {
            let content = fs::read_to_string(&override_path).map_err(|e| {
                Error::Config(format!("Failed to read prompt override: {}", e))
            })?;
            let (metadata, body) = parse_prompt(&content)?;
            tracing::debug!(prompt = id.as_str(), path = %override_path.display(), "Using prompt override");
            return Ok(Prompt {
                metadata,
                content: body,
                override_path: Some(override_path),
            });
        }
    }

    let (metadata, body) = parse_prompt(id.default_content())?;
    Ok(Prompt {
        metadata,
        content: body,
        override_path: None,
    })
}

/// Default prompts override directory
pub fn default_prompts_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tally").join("prompts").join("overrides"))
}

/// Parse a prompt file into metadata and body
fn parse_prompt(content: &str) -> Result<(PromptMetadata, String)> {
    let content = content.trim();

    if !content.starts_with("---") {
        return Err(Error::Config(
            "Prompt must start with YAML frontmatter (---)".into(),
        ));
    }

    let rest = &content[3..];
    let end = rest.find("---").ok_or_else(|| {
        Error::Config("Prompt frontmatter not closed (missing second ---)".into())
    })?;

    let frontmatter = rest[..end].trim();
    let body = rest[end + 3..].trim();

    let metadata: PromptMetadata = serde_yaml::from_str(frontmatter)
        .map_err(|e| Error::Config(format!("Invalid prompt frontmatter: {}", e)))?;

    Ok((metadata, body.to_string()))
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").expect("valid regex"))
}

/// Resolve `{{#if var}}...{{/if}}` blocks against `vars`
fn remove_unmatched_conditionals(content: &str, vars: &HashMap<&str, String>) -> String {
    let mut result = content.to_string();

    while let Some(if_start) = result.find("{{#if ") {
        let var_start = if_start + 6;
        let Some(var_end) = result[var_start..].find("}}") else {
            break;
        };
        let var_name = &result[var_start..var_start + var_end];
        let block_start = var_start + var_end + 2;

        let Some(endif_pos) = result[block_start..].find("{{/if}}") else {
            break;
        };
        let block_content = &result[block_start..block_start + endif_pos];
        let full_end = block_start + endif_pos + 7;

        let keep = vars.get(var_name).is_some_and(|v| !v.is_empty());
        result = if keep {
            format!("{}{}{}", &result[..if_start], block_content, &result[full_end..])
        } else {
            format!("{}{}", &result[..if_start], &result[full_end..])
        };
    }

    result
}
