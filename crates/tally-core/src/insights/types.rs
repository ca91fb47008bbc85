//! Core types for the insight pipeline

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ai::schema::{Schema, StructuredResponse};
use crate::error::Result;
use crate::models::YearMonth;

/// Kinds of persisted insights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    /// Where the money went this month
    SpendingPattern,
    /// Suggested monthly budget per category
    BudgetSuggestion,
    /// Unusual transactions against the historical baseline
    AnomalyDetection,
    /// How to reach a savings goal
    SavingsAdvice,
}

impl InsightKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightKind::SpendingPattern => "spending_pattern",
            InsightKind::BudgetSuggestion => "budget_suggestion",
            InsightKind::AnomalyDetection => "anomaly_detection",
            InsightKind::SavingsAdvice => "savings_advice",
        }
    }

    /// Title used when persisting an insight of this kind
    pub fn title(&self, month: YearMonth) -> String {
        let label = match self {
            InsightKind::SpendingPattern => "spending analysis",
            InsightKind::BudgetSuggestion => "budget suggestion",
            InsightKind::AnomalyDetection => "anomaly detection",
            InsightKind::SavingsAdvice => "savings advice",
        };
        format!("{} {}", month, label)
    }

    pub fn all() -> &'static [InsightKind] {
        &[
            InsightKind::SpendingPattern,
            InsightKind::BudgetSuggestion,
            InsightKind::AnomalyDetection,
            InsightKind::SavingsAdvice,
        ]
    }
}

impl fmt::Display for InsightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for InsightKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "spending_pattern" => Ok(InsightKind::SpendingPattern),
            "budget_suggestion" => Ok(InsightKind::BudgetSuggestion),
            "anomaly_detection" => Ok(InsightKind::AnomalyDetection),
            "savings_advice" => Ok(InsightKind::SavingsAdvice),
            _ => Err(format!("Unknown insight kind: {}", s)),
        }
    }
}

/// An insight ready to be stored (before it has an id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInsight {
    pub kind: InsightKind,
    pub title: String,
    /// Validated structure, serialized as JSON
    pub content: String,
    /// Inputs the analysis was computed from
    pub metadata: serde_json::Value,
    pub month: YearMonth,
}

impl NewInsight {
    /// Build from a validated response structure
    pub fn from_structured<T: Serialize>(
        kind: InsightKind,
        month: YearMonth,
        content: &T,
        metadata: serde_json::Value,
    ) -> Result<Self> {
        Ok(Self {
            kind,
            title: kind.title(month),
            content: serde_json::to_string(content)?,
            metadata,
            month,
        })
    }
}

/// A persisted insight; never updated after insert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub id: i64,
    pub kind: InsightKind,
    pub title: String,
    pub content: String,
    pub metadata: serde_json::Value,
    pub month: YearMonth,
    pub created_at: DateTime<Utc>,
}

impl Insight {
    /// Parse the stored content back into JSON
    pub fn content_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.content)?)
    }
}

// =============================================================================
// Response structures
// =============================================================================

/// Result of a monthly spending analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingAnalysis {
    pub summary: String,
    pub top_spending: Vec<TopSpending>,
    pub unnecessary_spending: Vec<UnnecessarySpending>,
    pub saving_opportunities: Vec<String>,
    pub trends: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopSpending {
    pub category: String,
    pub amount: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnnecessarySpending {
    pub description: String,
    pub amount: f64,
    pub suggestion: String,
}

impl StructuredResponse for SpendingAnalysis {
    fn schema() -> Schema {
        Schema::object(vec![
            ("summary", Schema::string()),
            (
                "topSpending",
                Schema::array_of(Schema::object(vec![
                    ("category", Schema::string()),
                    ("amount", Schema::number()),
                    ("percentage", Schema::number()),
                ])),
            ),
            (
                "unnecessarySpending",
                Schema::array_of(Schema::object(vec![
                    ("description", Schema::string()),
                    ("amount", Schema::number()),
                    ("suggestion", Schema::string()),
                ])),
            ),
            ("savingOpportunities", Schema::array_of(Schema::string())),
            ("trends", Schema::array_of(Schema::string())),
        ])
    }
}

/// Suggested monthly budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetSuggestion {
    pub total_budget: f64,
    pub category_budgets: BTreeMap<String, f64>,
    pub savings_target: f64,
    pub insights: Vec<String>,
}

impl StructuredResponse for BudgetSuggestion {
    fn schema() -> Schema {
        Schema::object(vec![
            ("totalBudget", Schema::number()),
            ("categoryBudgets", Schema::record_of(Schema::number())),
            ("savingsTarget", Schema::number()),
            ("insights", Schema::array_of(Schema::string())),
        ])
    }
}

/// Suggested category for a single transaction description (not persisted)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySuggestion {
    pub suggested_category: String,
    /// 0.0 to 1.0
    pub confidence: f64,
    pub reasoning: String,
}

impl StructuredResponse for CategorySuggestion {
    fn schema() -> Schema {
        Schema::object(vec![
            ("suggestedCategory", Schema::string()),
            ("confidence", Schema::number_in(0.0, 1.0)),
            ("reasoning", Schema::string()),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub description: String,
    pub amount: f64,
    /// As reported by the model; not guaranteed to be a valid date
    pub date: String,
    pub reason: String,
    pub severity: AnomalySeverity,
}

/// Unusual transactions found in a month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub anomalies: Vec<Anomaly>,
    pub summary: String,
    pub recommendation: String,
}

impl StructuredResponse for AnomalyReport {
    fn schema() -> Schema {
        Schema::object(vec![
            (
                "anomalies",
                Schema::array_of(Schema::object(vec![
                    ("description", Schema::string()),
                    ("amount", Schema::number()),
                    ("date", Schema::string()),
                    ("reason", Schema::string()),
                    ("severity", Schema::one_of(&["low", "medium", "high"])),
                ])),
            ),
            ("summary", Schema::string()),
            ("recommendation", Schema::string()),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feasibility {
    Easy,
    Moderate,
    Challenging,
    Difficult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsStrategy {
    pub action: String,
    pub potential_savings: f64,
    pub difficulty: Difficulty,
}

/// Plan for reaching a savings goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsAdvice {
    pub current_savings: f64,
    pub required_monthly_savings: f64,
    pub gap: f64,
    pub feasibility: Feasibility,
    pub strategies: Vec<SavingsStrategy>,
    /// Horizon label (e.g. "3 months") to projected balance
    pub projected_savings: BTreeMap<String, f64>,
    pub motivation: String,
}

impl StructuredResponse for SavingsAdvice {
    fn schema() -> Schema {
        Schema::object(vec![
            ("currentSavings", Schema::number()),
            ("requiredMonthlySavings", Schema::number()),
            ("gap", Schema::number()),
            (
                "feasibility",
                Schema::one_of(&["easy", "moderate", "challenging", "difficult"]),
            ),
            (
                "strategies",
                Schema::array_of(Schema::object(vec![
                    ("action", Schema::string()),
                    ("potentialSavings", Schema::number()),
                    ("difficulty", Schema::one_of(&["easy", "medium", "hard"])),
                ])),
            ),
            ("projectedSavings", Schema::record_of(Schema::number())),
            ("motivation", Schema::string()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::parsing::extract_and_validate;
    use crate::error::{Error, ParseFailure};

    #[test]
    fn test_insight_kind_round_trip_names() {
        for kind in InsightKind::all() {
            assert_eq!(InsightKind::from_str(kind.as_str()).unwrap(), *kind);
        }
        assert!(InsightKind::from_str("category_suggestion").is_err());
    }

    #[test]
    fn test_insight_kind_title() {
        let month: YearMonth = "2024-05".parse().unwrap();
        assert_eq!(
            InsightKind::AnomalyDetection.title(month),
            "2024-05 anomaly detection"
        );
    }

    #[test]
    fn test_spending_analysis_from_model_text() {
        let raw = r#"```json
{
  "summary": "Food dominates spending.",
  "topSpending": [{"category": "food", "amount": 450, "percentage": 45.0}],
  "unnecessarySpending": [{"description": "Delivery fees", "amount": 60, "suggestion": "Cook at home"}],
  "savingOpportunities": ["Cancel unused gym"],
  "trends": ["Weekend spikes",],
}
```"#;
        let parsed: SpendingAnalysis = extract_and_validate(raw).unwrap();
        assert_eq!(parsed.top_spending[0].category, "food");
        assert_eq!(parsed.unnecessary_spending[0].amount, 60.0);
        assert_eq!(parsed.trends, vec!["Weekend spikes"]);
    }

    #[test]
    fn test_budget_suggestion_record_values_must_be_numbers() {
        let raw = r#"{"totalBudget": 2000, "categoryBudgets": {"food": "500"}, "savingsTarget": 300, "insights": []}"#;
        match extract_and_validate::<BudgetSuggestion>(raw) {
            Err(Error::ResponseParse(e)) => {
                assert_eq!(e.reason, ParseFailure::SchemaViolation);
                assert!(e.detail.contains("categoryBudgets.food"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_category_suggestion_confidence_range() {
        let ok = r#"{"suggestedCategory": "food", "confidence": 0.9, "reasoning": "restaurant"}"#;
        let parsed: CategorySuggestion = extract_and_validate(ok).unwrap();
        assert_eq!(parsed.suggested_category, "food");

        let too_high = r#"{"suggestedCategory": "food", "confidence": 1.2, "reasoning": "sure"}"#;
        assert!(extract_and_validate::<CategorySuggestion>(too_high).is_err());
    }

    #[test]
    fn test_anomaly_severity_enum() {
        let raw = r#"{"anomalies": [{"description": "TV", "amount": 1500, "date": "2024-05-03", "reason": "10x average", "severity": "high"}], "summary": "One large purchase", "recommendation": "Review it"}"#;
        let parsed: AnomalyReport = extract_and_validate(raw).unwrap();
        assert_eq!(parsed.anomalies[0].severity, AnomalySeverity::High);

        let bad = raw.replace("\"high\"", "\"extreme\"");
        assert!(extract_and_validate::<AnomalyReport>(&bad).is_err());
    }

    #[test]
    fn test_anomaly_report_empty_list() {
        let raw = r#"{"anomalies": [], "summary": "Nothing unusual", "recommendation": "Keep going"}"#;
        let parsed: AnomalyReport = extract_and_validate(raw).unwrap();
        assert!(parsed.anomalies.is_empty());
    }

    #[test]
    fn test_savings_advice() {
        let raw = r#"{
            "currentSavings": 1000,
            "requiredMonthlySavings": 500,
            "gap": 200,
            "feasibility": "moderate",
            "strategies": [{"action": "Meal prep", "potentialSavings": 150, "difficulty": "easy"}],
            "projectedSavings": {"3 months": 2500, "6 months": 4000},
            "motivation": "You can do it"
        }"#;
        let parsed: SavingsAdvice = extract_and_validate(raw).unwrap();
        assert_eq!(parsed.feasibility, Feasibility::Moderate);
        assert_eq!(parsed.strategies[0].difficulty, Difficulty::Easy);
        assert_eq!(parsed.projected_savings["6 months"], 4000.0);
    }

    #[test]
    fn test_new_insight_serializes_content_camel_case() {
        let month: YearMonth = "2024-05".parse().unwrap();
        let advice = BudgetSuggestion {
            total_budget: 2000.0,
            category_budgets: BTreeMap::from([("food".to_string(), 500.0)]),
            savings_target: 300.0,
            insights: vec![],
        };
        let insight = NewInsight::from_structured(
            InsightKind::BudgetSuggestion,
            month,
            &advice,
            serde_json::json!({"month": "2024-05", "income": 2500}),
        )
        .unwrap();

        assert_eq!(insight.title, "2024-05 budget suggestion");
        let content: serde_json::Value = serde_json::from_str(&insight.content).unwrap();
        assert_eq!(content["totalBudget"], 2000.0);
        assert_eq!(content["categoryBudgets"]["food"], 500.0);
    }
}
