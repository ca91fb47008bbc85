//! Tally CLI - Personal finance insights
//!
//! Usage:
//!   tally init                       Initialize database
//!   tally add -c Food -a 12.5        Record an expense
//!   tally analyze spending -m 2024-03
//!   tally overview -m 2024-03        Run the monthly analyses concurrently

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = cli.config.as_deref();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db),
        Commands::Add {
            date,
            category,
            description,
            amount,
            kind,
        } => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_add(&db, date.as_deref(), &category, &description, amount, &kind)
        }
        Commands::Categories { action } => {
            let db = commands::open_db(&cli.db)?;
            match action {
                None => commands::cmd_categories_list(&db),
                Some(CategoriesAction::Add { name, color, icon }) => {
                    commands::cmd_categories_add(&db, &name, color.as_deref(), icon.as_deref())
                }
            }
        }
        Commands::Stats { month } => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_stats(&db, month.as_deref())
        }
        Commands::Analyze {
            kind,
            month,
            income,
            goal,
            timeframe,
            current,
        } => {
            let pipeline = commands::build_pipeline(&cli.db, config)?;
            let request =
                commands::analysis_request(&kind, month.as_deref(), income, goal, timeframe, current)?;
            commands::cmd_analyze(&pipeline, &request).await
        }
        Commands::Overview {
            month,
            goal,
            timeframe,
            current,
        } => {
            let pipeline = commands::build_pipeline(&cli.db, config)?;
            let month = commands::parse_month(month.as_deref())?;
            let goal = commands::savings_goal(goal, timeframe, current);
            commands::cmd_overview(&pipeline, month, goal).await
        }
        Commands::Categorize { description } => {
            let pipeline = commands::build_pipeline(&cli.db, config)?;
            commands::cmd_categorize(&pipeline, &description).await
        }
        Commands::Insights { month, json } => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_insights(&db, month.as_deref(), json)
        }
        Commands::Health => commands::cmd_health().await,
    }
}
