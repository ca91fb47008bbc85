//! Financial aggregation: monthly sums, category breakdowns, baselines
//!
//! Everything here is a pure function over transaction snapshots. The numbers
//! are what the insight prompts embed and what anomaly detection compares
//! against.
//!
//! There are two month-range helpers on purpose:
//! - [`analysis_window`] ends on the literal day `31` of every month, which is
//!   what every AI analysis query uses
//! - [`calendar_window`] ends on the real last day of the month, which is
//!   what the dashboard stats use

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{DateWindow, TransactionFact, TransactionKind, YearMonth};

/// Income/expense totals for a set of transactions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyStats {
    pub income: f64,
    pub expense: f64,
    /// Expense totals keyed by exact category name
    pub by_category: BTreeMap<String, f64>,
}

impl MonthlyStats {
    /// Income left over after expenses
    pub fn net(&self) -> f64 {
        self.income - self.expense
    }
}

/// Historical average expense per category, rounded to whole units
pub type CategoryBaseline = BTreeMap<String, i64>;

/// Sum income and expense, and break expenses down by category
pub fn monthly_stats(facts: &[TransactionFact]) -> MonthlyStats {
    let mut stats = MonthlyStats::default();

    for fact in facts {
        match fact.kind {
            TransactionKind::Income => stats.income += fact.amount,
            TransactionKind::Expense => {
                stats.expense += fact.amount;
                *stats
                    .by_category
                    .entry(fact.category.clone())
                    .or_insert(0.0) += fact.amount;
            }
        }
    }

    stats
}

/// Date range used by AI analysis queries: `YYYY-MM-01` through `YYYY-MM-31`
///
/// The end bound is always day 31 regardless of month length.
pub fn analysis_window(month: YearMonth) -> DateWindow {
    DateWindow::new(format!("{}-01", month), format!("{}-31", month))
}

/// Date range for dashboard stats: first through last calendar day
pub fn calendar_window(month: YearMonth) -> DateWindow {
    DateWindow::new(
        format!("{}-01", month),
        month.last_day().format("%Y-%m-%d").to_string(),
    )
}

/// The month before `month`, wrapping January to December of the prior year
pub fn previous_month(month: YearMonth) -> YearMonth {
    months_ago(month, 1)
}

/// `n` months before `month`
pub fn months_ago(month: YearMonth, n: u32) -> YearMonth {
    let mut year = month.year();
    let mut m = month.month() as i64 - n as i64;
    while m <= 0 {
        m += 12;
        year -= 1;
    }
    // m is now in 1..=12
    YearMonth::new(year, m as u32).unwrap_or(month)
}

/// History window for anomaly baselines: three months back through the first
/// day of `month`, inclusive of that first day
pub fn baseline_window(month: YearMonth) -> DateWindow {
    DateWindow::new(
        format!("{}-01", months_ago(month, 3)),
        format!("{}-01", month),
    )
}

/// Rounded mean amount per category
pub fn category_baseline(facts: &[TransactionFact]) -> CategoryBaseline {
    let mut totals: BTreeMap<&str, (f64, u32)> = BTreeMap::new();

    for fact in facts {
        let entry = totals.entry(fact.category.as_str()).or_insert((0.0, 0));
        entry.0 += fact.amount;
        entry.1 += 1;
    }

    totals
        .into_iter()
        .map(|(category, (sum, count))| {
            let avg = sum / count.max(1) as f64;
            (category.to_string(), avg.round() as i64)
        })
        .collect()
}

/// Monthly amount needed to reach `goal` from `current` within `months`
pub fn required_monthly_savings(goal: f64, current: f64, months: u32) -> f64 {
    ((goal - current) / months.max(1) as f64).ceil()
}
