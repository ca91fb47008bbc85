//! Category database operations

use rusqlite::{params, OptionalExtension};
use tracing::info;

use super::Database;
use crate::error::{Error, Result};
use crate::models::Category;

/// Seed set: (name, color, icon)
pub const DEFAULT_CATEGORIES: &[(&str, &str, &str)] = &[
    ("Food", "#ef4444", "utensils"),
    ("Transport", "#3b82f6", "car"),
    ("Shopping", "#ec4899", "shopping-bag"),
    ("Utilities", "#f59e0b", "receipt"),
    ("Housing", "#10b981", "home"),
    ("Medical", "#8b5cf6", "heart"),
    ("Culture", "#6366f1", "coffee"),
    ("Other", "#64748b", "gift"),
];

fn row_to_category(row: &rusqlite::Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        color: row.get(2)?,
        icon: row.get(3)?,
    })
}

impl Database {
    /// Create a category, returning its id
    pub fn create_category(&self, name: &str, color: Option<&str>, icon: Option<&str>) -> Result<i64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidData("Category name cannot be empty".into()));
        }
        if self.get_category_by_name(name)?.is_some() {
            return Err(Error::InvalidData(format!("Category already exists: {}", name)));
        }

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO categories (name, color, icon) VALUES (?, ?, ?)",
            params![name, color.unwrap_or("#6366f1"), icon.unwrap_or("receipt")],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All categories, ordered by name
    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, name, color, icon FROM categories ORDER BY name")?;
        let categories = stmt
            .query_map([], row_to_category)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    pub fn get_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        let conn = self.conn()?;
        let category = conn
            .query_row(
                "SELECT id, name, color, icon FROM categories WHERE name = ?",
                params![name],
                row_to_category,
            )
            .optional()?;
        Ok(category)
    }

    /// Insert the default categories that don't exist yet; returns how many were added
    pub fn seed_default_categories(&self) -> Result<usize> {
        let conn = self.conn()?;
        let mut added = 0;
        for (name, color, icon) in DEFAULT_CATEGORIES {
            added += conn.execute(
                "INSERT OR IGNORE INTO categories (name, color, icon) VALUES (?, ?, ?)",
                params![name, color, icon],
            )?;
        }
        info!(added, "Seeded default categories");
        Ok(added)
    }
}
