//! Transaction and category command implementations

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tally_core::db::Database;
use tally_core::models::{TransactionFact, TransactionFilter, TransactionKind};
use tally_core::stats::{calendar_window, monthly_stats};

use super::core::parse_month;

pub fn cmd_add(
    db: &Database,
    date: Option<&str>,
    category: &str,
    description: &str,
    amount: f64,
    kind: &str,
) -> Result<()> {
    let date = match date {
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{}' (expected YYYY-MM-DD)", d))?,
        None => chrono::Local::now().date_naive(),
    };
    let kind = kind.parse::<TransactionKind>().map_err(anyhow::Error::msg)?;

    if db.get_category_by_name(category)?.is_none() {
        println!(
            "⚠️  Category '{}' does not exist yet. Add it with: tally categories add \"{}\"",
            category, category
        );
    }

    let fact = TransactionFact::new(date, category, description, amount, kind);
    let id = db
        .insert_transaction(&fact)
        .context("Failed to record transaction")?;

    println!(
        "✅ Recorded {} #{}: {} {} {:.2} ({})",
        kind, id, date, category, amount, description
    );
    Ok(())
}

pub fn cmd_categories_list(db: &Database) -> Result<()> {
    let categories = db.list_categories()?;

    if categories.is_empty() {
        println!("No categories yet. Run 'tally init' to seed the defaults.");
        return Ok(());
    }

    println!("📂 Categories");
    println!("   ─────────────────────────────");
    for category in &categories {
        println!(
            "   {:<14} {}  {}",
            category.name, category.color, category.icon
        );
    }
    Ok(())
}

pub fn cmd_categories_add(
    db: &Database,
    name: &str,
    color: Option<&str>,
    icon: Option<&str>,
) -> Result<()> {
    let id = db
        .create_category(name, color, icon)
        .context("Failed to create category")?;
    println!("✅ Created category '{}' (id: {})", name.trim(), id);
    Ok(())
}

/// Calendar-month totals (real last day of the month)
pub fn cmd_stats(db: &Database, month: Option<&str>) -> Result<()> {
    let month = parse_month(month)?;
    let facts = db.list_transactions(&calendar_window(month), &TransactionFilter::all())?;
    let stats = monthly_stats(&facts);

    println!("📊 {} ({} transactions)", month, facts.len());
    println!("   ─────────────────────────────");
    println!("   Income:   {:>12.2}", stats.income);
    println!("   Expenses: {:>12.2}", stats.expense);
    println!("   Net:      {:>12.2}", stats.net());

    if !stats.by_category.is_empty() {
        println!();
        println!("   By category:");
        let mut rows: Vec<_> = stats.by_category.iter().collect();
        rows.sort_by(|a, b| b.1.total_cmp(a.1));
        for (category, amount) in rows {
            let share = if stats.expense > 0.0 {
                amount / stats.expense * 100.0
            } else {
                0.0
            };
            println!("   {:<14} {:>10.2}  {:>5.1}%", category, amount, share);
        }
    }
    Ok(())
}
