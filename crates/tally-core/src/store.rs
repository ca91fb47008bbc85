//! Storage seam for the insight pipeline
//!
//! The pipeline only reads transaction snapshots and categories, and appends
//! insights. `Database` is the production implementation.

use async_trait::async_trait;

use crate::db::Database;
use crate::error::Result;
use crate::insights::{Insight, NewInsight};
use crate::models::{Category, DateWindow, TransactionFact, TransactionFilter, YearMonth};

#[async_trait]
pub trait InsightStore: Send + Sync {
    /// Transactions dated within `window` matching `filter`, newest first
    async fn read_transactions(
        &self,
        window: &DateWindow,
        filter: &TransactionFilter,
    ) -> Result<Vec<TransactionFact>>;

    async fn read_categories(&self) -> Result<Vec<Category>>;

    /// Append an insight; existing insights are never modified
    async fn insert_insight(&self, insight: NewInsight) -> Result<Insight>;

    /// Persisted insights for `month`, newest first
    async fn list_insights(&self, month: YearMonth) -> Result<Vec<Insight>>;
}

/// Run a rusqlite call on the blocking pool so sibling analyses keep running
async fn blocking<T, F>(db: &Database, f: F) -> Result<T>
where
    F: FnOnce(&Database) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db)).await?
}

#[async_trait]
impl InsightStore for Database {
    async fn read_transactions(
        &self,
        window: &DateWindow,
        filter: &TransactionFilter,
    ) -> Result<Vec<TransactionFact>> {
        let (window, filter) = (window.clone(), filter.clone());
        blocking(self, move |db| db.list_transactions(&window, &filter)).await
    }

    async fn read_categories(&self) -> Result<Vec<Category>> {
        blocking(self, |db| db.list_categories()).await
    }

    async fn insert_insight(&self, insight: NewInsight) -> Result<Insight> {
        blocking(self, move |db| Database::insert_insight(db, &insight)).await
    }

    async fn list_insights(&self, month: YearMonth) -> Result<Vec<Insight>> {
        blocking(self, move |db| Database::list_insights(db, Some(month))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    use crate::insights::InsightKind;
    use crate::models::TransactionKind;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[tokio::test]
    async fn test_database_store_round_trip() {
        let db = Database::in_memory().unwrap();
        db.seed_default_categories().unwrap();
        db.insert_transaction(&TransactionFact::new(
            date("2024-03-09"),
            "Food",
            "groceries",
            42.5,
            TransactionKind::Expense,
        ))
        .unwrap();
        let store: &dyn InsightStore = &db;
        let month: YearMonth = "2024-03".parse().unwrap();

        let window = DateWindow::new("2024-03-01", "2024-03-31");
        let facts = store
            .read_transactions(&window, &TransactionFilter::all())
            .await
            .unwrap();
        assert_eq!(facts.len(), 1);
        assert!(!store.read_categories().await.unwrap().is_empty());

        let stored = store
            .insert_insight(NewInsight {
                kind: InsightKind::SpendingPattern,
                title: "2024-03 spending".into(),
                content: r#"{"summary":"ok"}"#.to_string(),
                metadata: json!({}),
                month,
            })
            .await
            .unwrap();
        let listed = store.list_insights(month).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, stored.id);
    }

    #[tokio::test]
    async fn test_concurrent_reads_share_the_pool() {
        let db = Database::in_memory().unwrap();
        db.seed_default_categories().unwrap();
        let store: &dyn InsightStore = &db;

        let reads = futures::future::join_all((0..4).map(|_| store.read_categories())).await;
        let expected = db.list_categories().unwrap().len();
        for read in reads {
            assert_eq!(read.unwrap().len(), expected);
        }
    }
}
