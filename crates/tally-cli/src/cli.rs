//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tally - AI insights for your personal finances
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Personal finance tracker with AI spending insights", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "tally.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Pipeline config file (defaults to the data dir override, then built-in)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and seed default categories
    Init,

    /// Record a transaction
    Add {
        /// Date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,

        /// Category name
        #[arg(short, long)]
        category: String,

        /// Description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Amount (non-negative)
        #[arg(short, long)]
        amount: f64,

        /// income or expense
        #[arg(short, long, default_value = "expense")]
        kind: String,
    },

    /// List or manage categories
    Categories {
        #[command(subcommand)]
        action: Option<CategoriesAction>,
    },

    /// Income/expense totals for a month
    Stats {
        /// Month (YYYY-MM, defaults to current month)
        #[arg(short, long)]
        month: Option<String>,
    },

    /// Run a single AI analysis and save it as an insight
    Analyze {
        /// Analysis: spending, budget, anomalies, savings
        kind: String,

        /// Month (YYYY-MM, defaults to current month)
        #[arg(short, long)]
        month: Option<String>,

        /// Monthly income (budget only)
        #[arg(long)]
        income: Option<f64>,

        /// Savings goal amount (savings only)
        #[arg(long)]
        goal: Option<f64>,

        /// Months to reach the goal (savings only)
        #[arg(long, default_value = "12")]
        timeframe: u32,

        /// Savings already set aside (savings only)
        #[arg(long, default_value = "0")]
        current: f64,
    },

    /// Run the monthly analyses concurrently and report every outcome
    Overview {
        /// Month (YYYY-MM, defaults to current month)
        #[arg(short, long)]
        month: Option<String>,

        /// Also produce savings advice toward this goal
        #[arg(long)]
        goal: Option<f64>,

        /// Months to reach the goal
        #[arg(long, default_value = "12")]
        timeframe: u32,

        /// Savings already set aside
        #[arg(long, default_value = "0")]
        current: f64,
    },

    /// Suggest a category for a transaction description (not saved)
    Categorize {
        /// Transaction description
        description: String,
    },

    /// List saved insights for a month
    Insights {
        /// Month (YYYY-MM, defaults to current month)
        #[arg(short, long)]
        month: Option<String>,

        /// Print the full stored content as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check connectivity to the configured AI backend
    Health,
}

#[derive(Subcommand)]
pub enum CategoriesAction {
    /// Add a new category
    Add {
        /// Category name
        name: String,

        /// Display color (e.g. "#3b82f6")
        #[arg(long)]
        color: Option<String>,

        /// Icon name
        #[arg(long)]
        icon: Option<String>,
    },
}
