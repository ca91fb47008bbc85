//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Core commands (init, health) and shared utilities (open_db, build_pipeline)
//! - `transactions` - Transaction and category commands (add, categories, stats)
//! - `insights` - AI analysis commands (analyze, overview, categorize, insights)

pub mod core;
pub mod insights;
pub mod transactions;

// Re-export command functions for main.rs
pub use core::*;
pub use insights::*;
pub use transactions::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
