//! AI insight database operations

use rusqlite::{params, OptionalExtension};

use super::{conversion_error, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::insights::{Insight, InsightKind, NewInsight};
use crate::models::YearMonth;

const INSIGHT_COLUMNS: &str = "id, kind, title, content, metadata, month, created_at";

fn row_to_insight(row: &rusqlite::Row) -> rusqlite::Result<Insight> {
    let kind: String = row.get(1)?;
    let metadata: String = row.get(4)?;
    let month: String = row.get(5)?;
    let created_at: String = row.get(6)?;

    Ok(Insight {
        id: row.get(0)?,
        kind: kind
            .parse::<InsightKind>()
            .map_err(|e| conversion_error(1, e))?,
        title: row.get(2)?,
        content: row.get(3)?,
        metadata: serde_json::from_str(&metadata)
            .map_err(|e| conversion_error(4, e.to_string()))?,
        month: month
            .parse::<YearMonth>()
            .map_err(|e| conversion_error(5, e.to_string()))?,
        created_at: parse_datetime(&created_at),
    })
}

impl Database {
    /// Append an insight and return the stored row
    pub fn insert_insight(&self, insight: &NewInsight) -> Result<Insight> {
        let conn = self.conn()?;
        let metadata = serde_json::to_string(&insight.metadata)?;

        conn.execute(
            "INSERT INTO ai_insights (kind, title, content, metadata, month) VALUES (?, ?, ?, ?, ?)",
            params![
                insight.kind.as_str(),
                insight.title,
                insight.content,
                metadata,
                insight.month.to_string()
            ],
        )?;
        let id = conn.last_insert_rowid();

        self.get_insight(id)?
            .ok_or_else(|| Error::NotFound(format!("insight {}", id)))
    }

    pub fn get_insight(&self, id: i64) -> Result<Option<Insight>> {
        let conn = self.conn()?;
        let insight = conn
            .query_row(
                &format!("SELECT {} FROM ai_insights WHERE id = ?", INSIGHT_COLUMNS),
                params![id],
                row_to_insight,
            )
            .optional()?;
        Ok(insight)
    }

    /// Insights for `month` (or all months), newest first
    pub fn list_insights(&self, month: Option<YearMonth>) -> Result<Vec<Insight>> {
        let conn = self.conn()?;
        let insights = match month {
            Some(month) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM ai_insights WHERE month = ? ORDER BY created_at DESC, id DESC",
                    INSIGHT_COLUMNS
                ))?;
                let rows = stmt.query_map(params![month.to_string()], row_to_insight)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM ai_insights ORDER BY created_at DESC, id DESC",
                    INSIGHT_COLUMNS
                ))?;
                let rows = stmt.query_map([], row_to_insight)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(insights)
    }
}
