//! Transaction database operations

use chrono::NaiveDate;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;

use super::{conversion_error, Database};
use crate::error::{Error, Result};
use crate::models::{DateWindow, TransactionFact, TransactionFilter, TransactionKind};

fn row_to_fact(row: &rusqlite::Row) -> rusqlite::Result<TransactionFact> {
    let date: String = row.get(0)?;
    let kind: String = row.get(4)?;

    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|e| conversion_error(0, format!("bad date '{}': {}", date, e)))?;
    let kind: TransactionKind = kind.parse().map_err(|e: String| conversion_error(4, e))?;

    Ok(TransactionFact {
        date,
        category: row.get(1)?,
        description: row.get(2)?,
        amount: row.get(3)?,
        kind,
    })
}

impl Database {
    /// Record a transaction, returning its id
    pub fn insert_transaction(&self, fact: &TransactionFact) -> Result<i64> {
        if !fact.amount.is_finite() || fact.amount < 0.0 {
            return Err(Error::InvalidData(format!(
                "Amount must be a non-negative number, got {}",
                fact.amount
            )));
        }
        if fact.category.trim().is_empty() {
            return Err(Error::InvalidData("Category cannot be empty".into()));
        }

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO transactions (date, category, description, amount, kind) VALUES (?, ?, ?, ?, ?)",
            rusqlite::params![
                fact.date.format("%Y-%m-%d").to_string(),
                fact.category,
                fact.description,
                fact.amount,
                fact.kind.as_str()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Transactions whose date falls in `window`, newest first
    ///
    /// Dates are compared as `YYYY-MM-DD` text, so an end bound past the real
    /// end of the month is fine.
    pub fn list_transactions(
        &self,
        window: &DateWindow,
        filter: &TransactionFilter,
    ) -> Result<Vec<TransactionFact>> {
        let mut sql = String::from(
            "SELECT date, category, description, amount, kind FROM transactions WHERE date >= ? AND date <= ?",
        );
        let mut args: Vec<SqlValue> = vec![
            SqlValue::Text(window.start.clone()),
            SqlValue::Text(window.end.clone()),
        ];

        if let Some(kind) = filter.kind {
            sql.push_str(" AND kind = ?");
            args.push(SqlValue::Text(kind.as_str().to_string()));
        }
        if let Some(ref category) = filter.category {
            sql.push_str(" AND category = ?");
            args.push(SqlValue::Text(category.clone()));
        }
        sql.push_str(" ORDER BY date DESC, id DESC");

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let facts = stmt
            .query_map(params_from_iter(args), row_to_fact)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(facts)
    }
}
