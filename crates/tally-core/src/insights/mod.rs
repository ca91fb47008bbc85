//! Insight pipeline - AI analyses over monthly transaction data
//!
//! Four analyses are persisted as insights:
//!
//! - **Spending pattern** - where the month's money went
//! - **Budget suggestion** - per-category budget for a given income
//! - **Anomaly detection** - unusual expenses against a three-month baseline
//! - **Savings advice** - a plan to reach a savings goal
//!
//! Transaction categorization uses the same machinery but returns its
//! suggestion directly without persisting it.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_core::insights::{AnalysisRequest, InsightPipeline};
//!
//! let client = AIClient::from_env().unwrap_or_else(AIClient::mock);
//! let pipeline = InsightPipeline::new(config, db, client, prompts);
//! let report = pipeline.month_overview(month, None).await;
//! println!("{} insights saved", report.success_count());
//! ```

pub mod pipeline;
pub mod types;

pub use pipeline::{
    AnalysisOutcome, AnalysisOutput, AnalysisRequest, AnalysisResult, Analyzed, FanOutEntry,
    FanOutReport, InsightPipeline, SavingsGoal,
};
pub use types::{
    Anomaly, AnomalyReport, AnomalySeverity, BudgetSuggestion, CategorySuggestion, Difficulty,
    Feasibility, Insight, InsightKind, NewInsight, SavingsAdvice, SavingsStrategy,
    SpendingAnalysis, TopSpending, UnnecessarySpending,
};
