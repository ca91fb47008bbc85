//! Mock backend for testing
//!
//! Replies are chosen by substring match on the prompt. Rules added with
//! [`MockBackend::on`] and [`MockBackend::on_sequence`] are checked first, in
//! the order they were added; if none match, a canned reply for each insight
//! kind is returned (keyed on the JSON field names each prompt asks for).
//! Every call is recorded.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

use super::ModelBackend;

/// What the mock does for a matching prompt
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Return this text
    Text(String),
    /// Fail with `Error::Backend`
    Error(String),
    /// Fail with `Error::RateLimited`
    RateLimited,
    /// Never answer; resolves only when the attempt is cancelled
    Hang,
}

impl MockReply {
    pub fn text(s: impl Into<String>) -> Self {
        MockReply::Text(s.into())
    }
}

/// A recorded `generate` call
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub prompt: String,
    pub max_output_tokens: u32,
}

#[derive(Debug)]
struct Rule {
    needle: String,
    /// Consumed front to back; the last reply repeats
    replies: VecDeque<MockReply>,
}

/// Mock AI backend for testing
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    rules: Arc<Mutex<Vec<Rule>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            ..Default::default()
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self::default()
    }

    /// Always reply with `reply` when the prompt contains `needle`
    pub fn on(self, needle: &str, reply: MockReply) -> Self {
        self.on_sequence(needle, vec![reply])
    }

    /// Reply with each of `replies` in turn for prompts containing `needle`
    pub fn on_sequence(self, needle: &str, replies: Vec<MockReply>) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                needle: needle.to_string(),
                replies: replies.into(),
            });
        }
        self
    }

    /// All calls made so far
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of calls whose prompt contained `needle`
    pub fn call_count(&self, needle: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.prompt.contains(needle))
            .count()
    }

    fn next_reply(&self, prompt: &str) -> MockReply {
        if let Ok(mut rules) = self.rules.lock() {
            if let Some(rule) = rules.iter_mut().find(|r| prompt.contains(&r.needle)) {
                let reply = if rule.replies.len() > 1 {
                    rule.replies.pop_front()
                } else {
                    rule.replies.front().cloned()
                };
                if let Some(reply) = reply {
                    return reply;
                }
            }
        }
        canned_reply(prompt)
    }
}

pub(crate) fn canned_reply(prompt: &str) -> MockReply {
    let text = if prompt.contains("\"topSpending\"") {
        SPENDING_REPLY
    } else if prompt.contains("\"categoryBudgets\"") {
        BUDGET_REPLY
    } else if prompt.contains("\"suggestedCategory\"") {
        CATEGORY_REPLY
    } else if prompt.contains("\"anomalies\"") {
        ANOMALY_REPLY
    } else if prompt.contains("\"projectedSavings\"") {
        SAVINGS_REPLY
    } else {
        return MockReply::Error("mock has no reply for this prompt".into());
    };
    MockReply::text(text)
}

const SPENDING_REPLY: &str = r#"```json
{
  "summary": "Spending is concentrated in housing and food.",
  "topSpending": [{"category": "Housing", "amount": 1200, "percentage": 60}],
  "unnecessarySpending": [],
  "savingOpportunities": ["Cook at home more often"],
  "trends": ["Stable month over month"]
}
```"#;

const BUDGET_REPLY: &str = r#"{
  "totalBudget": 2500,
  "categoryBudgets": {"Housing": 1200, "Food": 400},
  "savingsTarget": 500,
  "insights": ["Keep 20% of income for savings"]
}"#;

const CATEGORY_REPLY: &str =
    r#"{"suggestedCategory": "Food", "confidence": 0.8, "reasoning": "Looks like a grocery purchase"}"#;

const ANOMALY_REPLY: &str = r#"{
  "anomalies": [],
  "summary": "No unusual transactions this month.",
  "recommendation": "Keep tracking expenses."
}"#;

const SAVINGS_REPLY: &str = r#"{
  "currentSavings": 0,
  "requiredMonthlySavings": 500,
  "gap": 100,
  "feasibility": "moderate",
  "strategies": [{"action": "Cancel unused subscriptions", "potentialSavings": 50, "difficulty": "easy"}],
  "projectedSavings": {"month1": 500},
  "motivation": "Small steps add up."
}"#;

#[async_trait]
impl ModelBackend for MockBackend {
    async fn generate(
        &self,
        prompt: &str,
        max_output_tokens: u32,
        cancel: CancellationToken,
    ) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(MockCall {
                prompt: prompt.to_string(),
                max_output_tokens,
            });
        }

        match self.next_reply(prompt) {
            MockReply::Text(text) => Ok(text),
            MockReply::Error(message) => Err(Error::Backend(message)),
            MockReply::RateLimited => Err(Error::RateLimited("mock 429".into())),
            MockReply::Hang => {
                cancel.cancelled().await;
                Err(Error::Cancelled)
            }
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::parsing::extract_and_validate;
    use crate::insights::{AnomalyReport, BudgetSuggestion, CategorySuggestion, SavingsAdvice, SpendingAnalysis};

    async fn generate(mock: &MockBackend, prompt: &str) -> Result<String> {
        mock.generate(prompt, 100, CancellationToken::new()).await
    }

    #[tokio::test]
    async fn test_canned_replies_validate() {
        let mock = MockBackend::new();

        let text = generate(&mock, "\"topSpending\"").await.unwrap();
        extract_and_validate::<SpendingAnalysis>(&text).unwrap();
        let text = generate(&mock, "\"categoryBudgets\"").await.unwrap();
        extract_and_validate::<BudgetSuggestion>(&text).unwrap();
        let text = generate(&mock, "\"suggestedCategory\"").await.unwrap();
        extract_and_validate::<CategorySuggestion>(&text).unwrap();
        let text = generate(&mock, "\"anomalies\"").await.unwrap();
        extract_and_validate::<AnomalyReport>(&text).unwrap();
        let text = generate(&mock, "\"projectedSavings\"").await.unwrap();
        extract_and_validate::<SavingsAdvice>(&text).unwrap();
    }

    #[tokio::test]
    async fn test_unknown_prompt_is_error() {
        let mock = MockBackend::new();
        assert!(matches!(generate(&mock, "hello").await, Err(Error::Backend(_))));
    }

    #[tokio::test]
    async fn test_rules_take_precedence_and_sequence_repeats_last() {
        let mock = MockBackend::new().on_sequence(
            "topSpending",
            vec![MockReply::RateLimited, MockReply::text("{\"ok\": 1}")],
        );

        let err = generate(&mock, "\"topSpending\"").await.unwrap_err();
        assert!(err.is_rate_limit());
        assert_eq!(generate(&mock, "\"topSpending\"").await.unwrap(), "{\"ok\": 1}");
        assert_eq!(generate(&mock, "\"topSpending\"").await.unwrap(), "{\"ok\": 1}");
        assert_eq!(mock.call_count("topSpending"), 3);
    }

    #[tokio::test]
    async fn test_hang_resolves_on_cancel() {
        let mock = MockBackend::new().on("slow", MockReply::Hang);
        let cancel = CancellationToken::new();

        let call = mock.generate("slow prompt", 10, cancel.clone());
        cancel.cancel();
        assert!(matches!(call.await, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_calls_recorded() {
        let mock = MockBackend::new();
        let _ = mock.generate("\"anomalies\"", 1500, CancellationToken::new()).await;

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].max_output_tokens, 1500);
    }

    #[tokio::test]
    async fn test_health() {
        assert!(MockBackend::new().health_check().await);
        assert!(!MockBackend::unhealthy().health_check().await);
    }
}
