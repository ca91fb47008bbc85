//! Insight pipeline - runs AI analyses and persists their results
//!
//! Each analysis follows the same path:
//! facts window → aggregation → prompt → model call (timeout + retry) →
//! JSON extraction and validation → persisted insight.
//!
//! An empty facts window short-circuits with `Error::NoData` before any model
//! call. `run_all` fans several analyses out on the current task and reports
//! every outcome; one analysis failing never affects its siblings.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::ai::parsing::extract_and_validate;
use crate::ai::retry::{self, Sleeper, TokioSleeper};
use crate::ai::{ModelBackend, StructuredResponse};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::models::{TransactionFact, TransactionFilter, YearMonth};
use crate::prompts::{PromptId, PromptLibrary};
use crate::stats::{
    analysis_window, baseline_window, category_baseline, monthly_stats, previous_month,
    required_monthly_savings,
};
use crate::store::InsightStore;

use super::types::{
    AnomalyReport, BudgetSuggestion, CategorySuggestion, Insight, InsightKind, NewInsight,
    SavingsAdvice, SpendingAnalysis,
};

/// Inputs for a savings advice analysis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SavingsGoal {
    pub savings_goal: f64,
    /// Months to reach the goal (0 is treated as 1)
    pub timeframe_months: u32,
    pub current_savings: f64,
}

impl SavingsGoal {
    pub fn new(savings_goal: f64, timeframe_months: u32) -> Self {
        Self {
            savings_goal,
            timeframe_months,
            current_savings: 0.0,
        }
    }

    pub fn with_current_savings(mut self, current_savings: f64) -> Self {
        self.current_savings = current_savings;
        self
    }
}

/// One analysis to run as part of a fan-out
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisRequest {
    Spending { month: YearMonth },
    Budget { month: YearMonth, income: f64 },
    Anomalies { month: YearMonth },
    Savings { month: YearMonth, goal: SavingsGoal },
}

impl AnalysisRequest {
    pub fn kind(&self) -> InsightKind {
        match self {
            AnalysisRequest::Spending { .. } => InsightKind::SpendingPattern,
            AnalysisRequest::Budget { .. } => InsightKind::BudgetSuggestion,
            AnalysisRequest::Anomalies { .. } => InsightKind::AnomalyDetection,
            AnalysisRequest::Savings { .. } => InsightKind::SavingsAdvice,
        }
    }

    pub fn month(&self) -> YearMonth {
        match self {
            AnalysisRequest::Spending { month }
            | AnalysisRequest::Budget { month, .. }
            | AnalysisRequest::Anomalies { month }
            | AnalysisRequest::Savings { month, .. } => *month,
        }
    }
}

/// A validated result together with the insight it was stored as
#[derive(Debug, Clone)]
pub struct Analyzed<T> {
    pub result: T,
    pub insight: Insight,
}

impl<T> Analyzed<T> {
    fn map<U>(self, f: impl FnOnce(T) -> U) -> Analyzed<U> {
        Analyzed {
            result: f(self.result),
            insight: self.insight,
        }
    }
}

/// Typed result of any persisted analysis
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AnalysisResult {
    Spending(SpendingAnalysis),
    Budget(BudgetSuggestion),
    Anomalies(AnomalyReport),
    Savings(SavingsAdvice),
}

pub type AnalysisOutput = Analyzed<AnalysisResult>;

/// How one analysis in a fan-out ended
#[derive(Debug)]
pub enum AnalysisOutcome {
    Succeeded(AnalysisOutput),
    /// Nothing to analyze; no model call was made
    Skipped(String),
    Failed(Error),
}

impl AnalysisOutcome {
    fn from_result(result: Result<AnalysisOutput>) -> Self {
        match result {
            Ok(output) => AnalysisOutcome::Succeeded(output),
            Err(Error::NoData(reason)) => AnalysisOutcome::Skipped(reason),
            Err(e) => AnalysisOutcome::Failed(e),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisOutcome::Succeeded(_))
    }
}

#[derive(Debug)]
pub struct FanOutEntry {
    pub request: AnalysisRequest,
    pub outcome: AnalysisOutcome,
}

/// Per-analysis outcomes of a fan-out, in request order
#[derive(Debug)]
pub struct FanOutReport {
    entries: Vec<FanOutEntry>,
}

impl FanOutReport {
    pub fn entries(&self) -> &[FanOutEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<FanOutEntry> {
        self.entries
    }

    pub fn success_count(&self) -> usize {
        self.count(|o| matches!(o, AnalysisOutcome::Succeeded(_)))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|o| matches!(o, AnalysisOutcome::Skipped(_)))
    }

    pub fn failure_count(&self) -> usize {
        self.count(|o| matches!(o, AnalysisOutcome::Failed(_)))
    }

    /// Insights persisted by this fan-out
    pub fn insights(&self) -> impl Iterator<Item = &Insight> {
        self.entries.iter().filter_map(|e| match &e.outcome {
            AnalysisOutcome::Succeeded(output) => Some(&output.insight),
            _ => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (&AnalysisRequest, &Error)> {
        self.entries.iter().filter_map(|e| match &e.outcome {
            AnalysisOutcome::Failed(err) => Some((&e.request, err)),
            _ => None,
        })
    }

    fn count(&self, pred: impl Fn(&AnalysisOutcome) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.outcome)).count()
    }
}

/// Runs AI analyses against a store and a model backend
pub struct InsightPipeline<S: InsightStore, B: ModelBackend> {
    config: PipelineConfig,
    store: S,
    backend: B,
    prompts: PromptLibrary,
    sleeper: Arc<dyn Sleeper>,
}

impl<S: InsightStore, B: ModelBackend> InsightPipeline<S, B> {
    pub fn new(config: PipelineConfig, store: S, backend: B, prompts: PromptLibrary) -> Self {
        Self {
            config,
            store,
            backend,
            prompts,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replace how backoff delays are waited out
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Spending pattern analysis over every transaction of `month`
    pub async fn analyze_spending(&self, month: YearMonth) -> Result<Analyzed<SpendingAnalysis>> {
        let facts = self
            .store
            .read_transactions(&analysis_window(month), &TransactionFilter::all())
            .await?;
        if facts.is_empty() {
            return Err(Error::NoData(format!("no transactions to analyze for {}", month)));
        }

        let stats = monthly_stats(&facts);
        let expenses: Vec<TransactionFact> = facts.into_iter().filter(|f| f.is_expense()).collect();

        let mut vars = HashMap::new();
        vars.insert("month", month.to_string());
        vars.insert("income", format_amount(stats.income));
        vars.insert("expense", format_amount(stats.expense));
        vars.insert("net", format_amount(stats.net()));
        vars.insert("category_lines", amount_lines(stats.by_category.iter().map(|(c, a)| (c.as_str(), *a))));
        vars.insert("transaction_lines", transaction_lines(&expenses));

        let prompt = self.render(PromptId::SpendingAnalysis, &vars)?;
        let result: SpendingAnalysis = self.generate(&prompt, self.config.max_output_tokens).await?;

        let metadata = json!({ "month": month.to_string(), "stats": stats });
        self.persist(InsightKind::SpendingPattern, month, result, metadata)
            .await
    }

    /// Budget proposal for `month` given a monthly `income`
    ///
    /// The previous month's expenses are included as history when present.
    pub async fn suggest_budget(&self, month: YearMonth, income: f64) -> Result<Analyzed<BudgetSuggestion>> {
        let categories = self.store.read_categories().await?;
        if categories.is_empty() {
            return Err(Error::NoData("no categories defined".into()));
        }

        let history = self
            .store
            .read_transactions(
                &analysis_window(previous_month(month)),
                &TransactionFilter::expenses(),
            )
            .await?;

        let mut vars = HashMap::new();
        vars.insert("month", month.to_string());
        vars.insert("income", format_amount(income));
        vars.insert(
            "categories",
            categories
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        );
        if !history.is_empty() {
            let stats = monthly_stats(&history);
            vars.insert("history_total", format_amount(stats.expense));
            vars.insert(
                "history_lines",
                amount_lines(stats.by_category.iter().map(|(c, a)| (c.as_str(), *a))),
            );
        }

        let prompt = self.render(PromptId::BudgetSuggestion, &vars)?;
        let result: BudgetSuggestion = self.generate(&prompt, self.config.max_output_tokens).await?;

        let metadata = json!({ "month": month.to_string(), "income": income });
        self.persist(InsightKind::BudgetSuggestion, month, result, metadata)
            .await
    }

    /// Flag unusual expenses of `month` against the recent per-category average
    pub async fn detect_anomalies(&self, month: YearMonth) -> Result<Analyzed<AnomalyReport>> {
        let expenses = self
            .store
            .read_transactions(&analysis_window(month), &TransactionFilter::expenses())
            .await?;
        if expenses.is_empty() {
            return Err(Error::NoData(format!("no expenses to analyze for {}", month)));
        }

        let history = self
            .store
            .read_transactions(&baseline_window(month), &TransactionFilter::expenses())
            .await?;
        let baseline = category_baseline(&history);

        let baseline_lines = if baseline.is_empty() {
            "- (no history)".to_string()
        } else {
            baseline
                .iter()
                .map(|(category, avg)| format!("- {}: {}", category, avg))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let mut vars = HashMap::new();
        vars.insert("month", month.to_string());
        vars.insert("baseline_lines", baseline_lines);
        vars.insert("transaction_lines", transaction_lines(&expenses));

        let prompt = self.render(PromptId::AnomalyDetection, &vars)?;
        let result: AnomalyReport = self.generate(&prompt, self.config.max_output_tokens).await?;

        let metadata = json!({ "month": month.to_string(), "averageByCategory": baseline });
        self.persist(InsightKind::AnomalyDetection, month, result, metadata)
            .await
    }

    /// Savings plan for `goal`, using `month`'s income and expenses
    pub async fn provide_savings_advice(
        &self,
        month: YearMonth,
        goal: SavingsGoal,
    ) -> Result<Analyzed<SavingsAdvice>> {
        if !goal.savings_goal.is_finite() || goal.savings_goal <= 0.0 {
            return Err(Error::InvalidData(format!(
                "Savings goal must be positive, got {}",
                goal.savings_goal
            )));
        }

        let facts = self
            .store
            .read_transactions(&analysis_window(month), &TransactionFilter::all())
            .await?;
        if facts.is_empty() {
            return Err(Error::NoData(format!("no transactions to analyze for {}", month)));
        }

        let stats = monthly_stats(&facts);
        let timeframe = goal.timeframe_months.max(1);
        let required = required_monthly_savings(goal.savings_goal, goal.current_savings, timeframe);

        let mut vars = HashMap::new();
        vars.insert("income", format_amount(stats.income));
        vars.insert("expenses", format_amount(stats.expense));
        vars.insert("current_savings", format_amount(goal.current_savings));
        vars.insert("savings_goal", format_amount(goal.savings_goal));
        vars.insert("timeframe_months", timeframe.to_string());
        vars.insert("surplus", format_amount(stats.net()));
        vars.insert("required_monthly", format_amount(required));

        let prompt = self.render(PromptId::SavingsAdvice, &vars)?;
        let result: SavingsAdvice = self.generate(&prompt, self.config.max_output_tokens).await?;

        let metadata = json!({
            "month": month.to_string(),
            "income": stats.income,
            "expenses": stats.expense,
            "savingsGoal": goal.savings_goal,
            "timeframeMonths": timeframe,
            "currentSavings": goal.current_savings,
        });
        self.persist(InsightKind::SavingsAdvice, month, result, metadata)
            .await
    }

    /// Suggest a category for a transaction description (not persisted)
    pub async fn categorize_transaction(&self, description: &str) -> Result<CategorySuggestion> {
        let categories = self.store.read_categories().await?;
        if categories.is_empty() {
            return Err(Error::NoData("no categories defined".into()));
        }

        let mut vars = HashMap::new();
        vars.insert("description", description.to_string());
        vars.insert(
            "category_lines",
            categories
                .iter()
                .map(|c| format!("- {}", c.name))
                .collect::<Vec<_>>()
                .join("\n"),
        );

        let prompt = self.render(PromptId::CategorizeTransaction, &vars)?;
        self.generate(&prompt, self.config.categorize_max_output_tokens)
            .await
    }

    /// Persisted insights for `month`, newest first
    pub async fn list_insights(&self, month: YearMonth) -> Result<Vec<Insight>> {
        self.store.list_insights(month).await
    }

    /// Run a single analysis request
    pub async fn run(&self, request: &AnalysisRequest) -> Result<AnalysisOutput> {
        match *request {
            AnalysisRequest::Spending { month } => Ok(self
                .analyze_spending(month)
                .await?
                .map(AnalysisResult::Spending)),
            AnalysisRequest::Budget { month, income } => Ok(self
                .suggest_budget(month, income)
                .await?
                .map(AnalysisResult::Budget)),
            AnalysisRequest::Anomalies { month } => Ok(self
                .detect_anomalies(month)
                .await?
                .map(AnalysisResult::Anomalies)),
            AnalysisRequest::Savings { month, goal } => Ok(self
                .provide_savings_advice(month, goal)
                .await?
                .map(AnalysisResult::Savings)),
        }
    }

    /// Run `requests` concurrently and collect every outcome
    pub async fn run_all(&self, requests: &[AnalysisRequest]) -> FanOutReport {
        let runs = requests.iter().map(|request| async move {
            let outcome = AnalysisOutcome::from_result(self.run(request).await);
            match &outcome {
                AnalysisOutcome::Failed(e) => warn!(
                    analysis = request.kind().as_str(),
                    month = %request.month(),
                    error = %e,
                    "Analysis failed"
                ),
                AnalysisOutcome::Skipped(reason) => debug!(
                    analysis = request.kind().as_str(),
                    reason = %reason,
                    "Analysis skipped"
                ),
                AnalysisOutcome::Succeeded(_) => {}
            }
            FanOutEntry {
                request: request.clone(),
                outcome,
            }
        });

        let report = FanOutReport {
            entries: join_all(runs).await,
        };

        info!(
            succeeded = report.success_count(),
            skipped = report.skipped_count(),
            failed = report.failure_count(),
            "Insight fan-out complete"
        );
        report
    }

    /// Spending pattern and anomaly detection for `month`, plus savings
    /// advice when a goal is given
    pub async fn month_overview(&self, month: YearMonth, savings: Option<SavingsGoal>) -> FanOutReport {
        let mut requests = vec![
            AnalysisRequest::Spending { month },
            AnalysisRequest::Anomalies { month },
        ];
        if let Some(goal) = savings {
            requests.push(AnalysisRequest::Savings { month, goal });
        }
        self.run_all(&requests).await
    }

    fn render(&self, id: PromptId, vars: &HashMap<&str, String>) -> Result<String> {
        Ok(self.prompts.get(id)?.render_strict(vars))
    }

    async fn generate<T: StructuredResponse>(&self, prompt: &str, max_output_tokens: u32) -> Result<T> {
        debug!(
            model = self.backend.model(),
            prompt_len = prompt.len(),
            max_output_tokens,
            "Calling model"
        );

        let raw = retry::invoke(&self.config.retry, self.sleeper.as_ref(), |cancel| {
            self.backend.generate(prompt, max_output_tokens, cancel)
        })
        .await?;

        debug!(response_len = raw.len(), "Model response received");
        extract_and_validate(&raw)
    }

    async fn persist<T: Serialize>(
        &self,
        kind: InsightKind,
        month: YearMonth,
        result: T,
        metadata: serde_json::Value,
    ) -> Result<Analyzed<T>> {
        let new_insight = NewInsight::from_structured(kind, month, &result, metadata)?;
        let insight = self.store.insert_insight(new_insight).await?;
        info!(insight_id = insight.id, kind = kind.as_str(), month = %month, "Insight saved");
        Ok(Analyzed { result, insight })
    }
}

/// Whole amounts without decimals, everything else to two places
fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("{:.0}", amount)
    } else {
        format!("{:.2}", amount)
    }
}

fn amount_lines<'a>(items: impl Iterator<Item = (&'a str, f64)>) -> String {
    items
        .map(|(label, amount)| format!("- {}: {}", label, format_amount(amount)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn transaction_lines(facts: &[TransactionFact]) -> String {
    facts
        .iter()
        .map(|f| {
            format!(
                "{}: {} - {} ({})",
                f.date.format("%Y-%m-%d"),
                f.category,
                f.description,
                format_amount(f.amount)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{MockBackend, MockReply, RecordingSleeper, RetryPolicy};
    use crate::db::Database;
    use crate::error::ParseFailure;
    use crate::models::TransactionKind;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn ym(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    fn add(db: &Database, date: &str, category: &str, description: &str, amount: f64, kind: TransactionKind) {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        db.insert_transaction(&TransactionFact::new(date, category, description, amount, kind))
            .unwrap();
    }

    fn seeded_db() -> Database {
        let db = Database::in_memory().unwrap();
        db.seed_default_categories().unwrap();
        add(&db, "2024-02-10", "Food", "groceries", 200.0, TransactionKind::Expense);
        add(&db, "2024-03-01", "Salary", "pay", 3000.0, TransactionKind::Income);
        add(&db, "2024-03-05", "Food", "groceries", 150.5, TransactionKind::Expense);
        add(&db, "2024-03-20", "Housing", "rent", 1200.0, TransactionKind::Expense);
        db
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            retry: RetryPolicy {
                timeout: Duration::from_millis(200),
                ..RetryPolicy::default()
            },
            ..PipelineConfig::default()
        }
    }

    fn pipeline(db: Database, mock: MockBackend) -> (InsightPipeline<Database, MockBackend>, RecordingSleeper) {
        let sleeper = RecordingSleeper::new();
        let pipeline = InsightPipeline::new(
            fast_config(),
            db,
            mock,
            PromptLibrary::embedded_only().unwrap(),
        )
        .with_sleeper(Arc::new(sleeper.clone()));
        (pipeline, sleeper)
    }

    #[tokio::test]
    async fn test_analyze_spending_persists_insight() {
        let (pipeline, _) = pipeline(seeded_db(), MockBackend::new());

        let analyzed = pipeline.analyze_spending(ym("2024-03")).await.unwrap();
        assert!(!analyzed.result.summary.is_empty());
        assert_eq!(analyzed.insight.kind, InsightKind::SpendingPattern);
        assert_eq!(analyzed.insight.title, "2024-03 spending analysis");
        assert_eq!(analyzed.insight.metadata["month"], "2024-03");
        assert_eq!(analyzed.insight.metadata["stats"]["income"], 3000.0);
        assert_eq!(analyzed.insight.metadata["stats"]["byCategory"]["Food"], 150.5);

        let stored = pipeline.list_insights(ym("2024-03")).await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_spending_prompt_contents() {
        let mock = MockBackend::new();
        let (pipeline, _) = pipeline(seeded_db(), mock.clone());
        pipeline.analyze_spending(ym("2024-03")).await.unwrap();

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        let prompt = &calls[0].prompt;
        assert!(prompt.contains("Total income: 3000"));
        assert!(prompt.contains("- Food: 150.50"));
        assert!(prompt.contains("2024-03-20: Housing - rent (1200)"));
        assert!(!prompt.contains("Salary - pay"));
        assert!(prompt.ends_with("Just pure JSON."));
        assert_eq!(calls[0].max_output_tokens, 1500);
    }

    #[tokio::test]
    async fn test_empty_month_is_no_data_without_model_call() {
        let mock = MockBackend::new();
        let (pipeline, _) = pipeline(seeded_db(), mock.clone());

        let err = pipeline.analyze_spending(ym("2023-01")).await.unwrap_err();
        assert!(matches!(err, Error::NoData(_)));
        let err = pipeline.detect_anomalies(ym("2023-01")).await.unwrap_err();
        assert!(matches!(err, Error::NoData(_)));
        assert!(mock.calls().is_empty());
        assert!(pipeline.list_insights(ym("2023-01")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_budget_requires_categories() {
        let db = Database::in_memory().unwrap();
        let (pipeline, _) = pipeline(db, MockBackend::new());

        let err = pipeline.suggest_budget(ym("2024-03"), 3000.0).await.unwrap_err();
        assert!(matches!(err, Error::NoData(_)));
        let err = pipeline.categorize_transaction("coffee").await.unwrap_err();
        assert!(matches!(err, Error::NoData(_)));
    }

    #[tokio::test]
    async fn test_budget_includes_previous_month_history() {
        let mock = MockBackend::new();
        let (pipeline, _) = pipeline(seeded_db(), mock.clone());

        let analyzed = pipeline.suggest_budget(ym("2024-03"), 3000.0).await.unwrap();
        assert_eq!(analyzed.insight.metadata, json!({"month": "2024-03", "income": 3000.0}));
        assert_eq!(analyzed.result.category_budgets["Housing"], 1200.0);

        let prompt = &mock.calls()[0].prompt;
        assert!(prompt.contains("Previous month spending"));
        assert!(prompt.contains("- Food: 200"));
    }

    #[tokio::test]
    async fn test_budget_without_history_drops_block() {
        let mock = MockBackend::new();
        let (pipeline, _) = pipeline(seeded_db(), mock.clone());

        pipeline.suggest_budget(ym("2024-02"), 3000.0).await.unwrap();
        assert!(!mock.calls()[0].prompt.contains("Previous month spending"));
    }

    #[tokio::test]
    async fn test_anomaly_baseline_metadata() {
        let mock = MockBackend::new();
        let (pipeline, _) = pipeline(seeded_db(), mock.clone());

        let analyzed = pipeline.detect_anomalies(ym("2024-03")).await.unwrap();
        // history window runs through 2024-03-01 and includes it, but only expenses
        assert_eq!(
            analyzed.insight.metadata,
            json!({"month": "2024-03", "averageByCategory": {"Food": 200}})
        );
        let prompt = &mock.calls()[0].prompt;
        assert!(prompt.contains("- Food: 200"));
        assert!(!prompt.contains("Salary"));
    }

    #[tokio::test]
    async fn test_savings_advice_metadata() {
        let mock = MockBackend::new();
        let (pipeline, _) = pipeline(seeded_db(), mock.clone());

        let goal = SavingsGoal::new(1000.0, 3).with_current_savings(100.0);
        let analyzed = pipeline.provide_savings_advice(ym("2024-03"), goal).await.unwrap();
        assert_eq!(analyzed.insight.metadata["savingsGoal"], 1000.0);
        assert_eq!(analyzed.insight.metadata["timeframeMonths"], 3);
        assert_eq!(analyzed.insight.metadata["expenses"], 1350.5);

        let prompt = &mock.calls()[0].prompt;
        assert!(prompt.contains("Required monthly savings: 300"));
        assert!(prompt.contains("\"currentSavings\": 100,"));
    }

    #[tokio::test]
    async fn test_savings_goal_must_be_positive() {
        let (pipeline, _) = pipeline(seeded_db(), MockBackend::new());
        let err = pipeline
            .provide_savings_advice(ym("2024-03"), SavingsGoal::new(0.0, 3))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_categorize_is_not_persisted() {
        let mock = MockBackend::new();
        let (pipeline, _) = pipeline(seeded_db(), mock.clone());

        let suggestion = pipeline.categorize_transaction("Corner market").await.unwrap();
        assert_eq!(suggestion.suggested_category, "Food");
        assert_eq!(mock.calls()[0].max_output_tokens, 500);
        assert!(mock.calls()[0].prompt.contains("\"Corner market\""));
        assert!(pipeline.store().list_insights(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_description_with_template_markers_is_kept_verbatim() {
        let mock = MockBackend::new();
        let (pipeline, _) = pipeline(seeded_db(), mock.clone());

        let description = "Cafe {{#if nope}}LATTE{{/if}} tab {{category_lines}}";
        pipeline.categorize_transaction(description).await.unwrap();

        let prompt = &mock.calls()[0].prompt;
        assert!(prompt.contains(&format!("\"{}\"", description)));
        assert_eq!(prompt.matches("- Food").count(), 1);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let mock = MockBackend::new().on_sequence(
            "topSpending",
            vec![
                MockReply::Error("connection reset".into()),
                MockReply::RateLimited,
                MockReply::text(r#"{"summary": "s", "topSpending": [], "unnecessarySpending": [], "savingOpportunities": [], "trends": []}"#),
            ],
        );
        let (pipeline, sleeper) = pipeline(seeded_db(), mock.clone());

        pipeline.analyze_spending(ym("2024-03")).await.unwrap();
        assert_eq!(mock.calls().len(), 3);
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_secs(1), Duration::from_secs(60)]
        );
    }

    #[tokio::test]
    async fn test_invalid_response_is_not_persisted() {
        let mock = MockBackend::new().on("topSpending", MockReply::text("I cannot help with that"));
        let (pipeline, sleeper) = pipeline(seeded_db(), mock);

        let err = pipeline.analyze_spending(ym("2024-03")).await.unwrap_err();
        match err {
            Error::ResponseParse(e) => {
                assert_eq!(e.reason, ParseFailure::NoJsonFound);
                assert_eq!(e.raw_text, "I cannot help with that");
            }
            other => panic!("expected ResponseParse, got {:?}", other),
        }
        // parse failures are not retried
        assert!(sleeper.delays().is_empty());
        assert!(pipeline.list_insights(ym("2024-03")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_month_overview_counts() {
        let mock = MockBackend::new().on("\"anomalies\"", MockReply::Error("boom".into()));
        let (pipeline, _) = pipeline(seeded_db(), mock);

        let goal = SavingsGoal::new(1000.0, 10);
        let report = pipeline.month_overview(ym("2024-03"), Some(goal)).await;

        assert_eq!(report.entries().len(), 3);
        assert_eq!(report.success_count(), 2);
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.skipped_count(), 0);

        let kinds: Vec<_> = report.entries().iter().map(|e| e.request.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                InsightKind::SpendingPattern,
                InsightKind::AnomalyDetection,
                InsightKind::SavingsAdvice
            ]
        );
        let (failed, err) = report.failures().next().unwrap();
        assert_eq!(failed.kind(), InsightKind::AnomalyDetection);
        assert!(matches!(err, Error::InvocationExhausted { attempts: 3, .. }));
        assert_eq!(report.insights().count(), 2);
    }

    #[tokio::test]
    async fn test_run_all_skips_empty_months() {
        let (pipeline, _) = pipeline(seeded_db(), MockBackend::new());

        let report = pipeline
            .run_all(&[
                AnalysisRequest::Spending { month: ym("2024-03") },
                AnalysisRequest::Spending { month: ym("2022-01") },
            ])
            .await;
        assert_eq!(report.success_count(), 1);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.failure_count(), 0);
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(1200.0), "1200");
        assert_eq!(format_amount(150.5), "150.50");
        assert_eq!(format_amount(-3.0), "-3");
    }
}
