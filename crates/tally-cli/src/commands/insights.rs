//! AI analysis command implementations

use anyhow::{anyhow, bail, Context, Result};
use tally_core::ai::ModelBackend;
use tally_core::db::Database;
use tally_core::insights::{
    AnalysisOutcome, AnalysisRequest, AnalysisResult, AnomalyReport, BudgetSuggestion,
    FanOutReport, InsightPipeline, SavingsAdvice, SavingsGoal, SpendingAnalysis,
};
use tally_core::models::YearMonth;

use super::core::{describe_error, parse_month};
use super::truncate;

/// Build an analysis request from `tally analyze` arguments
pub fn analysis_request(
    kind: &str,
    month: Option<&str>,
    income: Option<f64>,
    goal: Option<f64>,
    timeframe: u32,
    current: f64,
) -> Result<AnalysisRequest> {
    let month = parse_month(month)?;

    let request = match kind {
        "spending" => AnalysisRequest::Spending { month },
        "budget" => AnalysisRequest::Budget {
            month,
            income: income.context("--income is required for a budget suggestion")?,
        },
        "anomalies" => AnalysisRequest::Anomalies { month },
        "savings" => {
            let goal = savings_goal(goal, timeframe, current)
                .context("--goal is required for savings advice")?;
            AnalysisRequest::Savings { month, goal }
        }
        other => bail!(
            "Unknown analysis '{}'. Valid: spending, budget, anomalies, savings",
            other
        ),
    };
    Ok(request)
}

pub fn savings_goal(goal: Option<f64>, timeframe: u32, current: f64) -> Option<SavingsGoal> {
    goal.map(|g| SavingsGoal::new(g, timeframe).with_current_savings(current))
}

pub async fn cmd_analyze<B: ModelBackend>(
    pipeline: &InsightPipeline<Database, B>,
    request: &AnalysisRequest,
) -> Result<()> {
    println!(
        "🤖 Running {} analysis for {}...",
        request.kind(),
        request.month()
    );

    let output = pipeline
        .run(request)
        .await
        .map_err(|e| anyhow!(describe_error(&e)))?;

    println!();
    print_result(&output.result);
    println!();
    println!("💾 Saved as insight #{} ({})", output.insight.id, output.insight.title);
    Ok(())
}

pub async fn cmd_overview<B: ModelBackend>(
    pipeline: &InsightPipeline<Database, B>,
    month: YearMonth,
    goal: Option<SavingsGoal>,
) -> Result<()> {
    println!("🤖 Running monthly analyses for {}...", month);

    let report = pipeline.month_overview(month, goal).await;
    print_report(&report);

    if report.failure_count() > 0 {
        bail!("{} of {} analyses failed", report.failure_count(), report.entries().len());
    }
    Ok(())
}

pub async fn cmd_categorize<B: ModelBackend>(
    pipeline: &InsightPipeline<Database, B>,
    description: &str,
) -> Result<()> {
    let suggestion = pipeline
        .categorize_transaction(description)
        .await
        .map_err(|e| anyhow!(describe_error(&e)))?;

    println!(
        "🏷️  \"{}\" → {} ({:.0}% confident)",
        description,
        suggestion.suggested_category,
        suggestion.confidence * 100.0
    );
    println!("   {}", suggestion.reasoning);
    Ok(())
}

pub fn cmd_insights(db: &Database, month: Option<&str>, json: bool) -> Result<()> {
    let month = parse_month(month)?;
    let insights = db.list_insights(Some(month))?;

    if insights.is_empty() {
        println!("No insights for {}. Run 'tally overview --month {}'.", month, month);
        return Ok(());
    }

    println!("💡 Insights for {} ({})", month, insights.len());
    println!("   ─────────────────────────────");
    for insight in &insights {
        println!(
            "   #{:<4} {:<18} {}  {}",
            insight.id,
            insight.kind.as_str(),
            insight.created_at.format("%Y-%m-%d %H:%M"),
            insight.title
        );
        if json {
            let content = insight.content_json()?;
            println!("{}", serde_json::to_string_pretty(&content)?);
        }
    }
    Ok(())
}

fn print_report(report: &FanOutReport) {
    println!();
    for entry in report.entries() {
        let kind = entry.request.kind();
        match &entry.outcome {
            AnalysisOutcome::Succeeded(output) => {
                println!("✅ {} → insight #{}", kind, output.insight.id);
                print_result(&output.result);
            }
            AnalysisOutcome::Skipped(reason) => println!("⏭️  {} skipped: {}", kind, reason),
            AnalysisOutcome::Failed(e) => println!("❌ {} failed: {}", kind, describe_error(e)),
        }
        println!();
    }

    println!("📊 Overview");
    println!("   ─────────────────────────────");
    println!("   Saved:   {}", report.success_count());
    println!("   Skipped: {}", report.skipped_count());
    println!("   Failed:  {}", report.failure_count());
}

fn print_result(result: &AnalysisResult) {
    match result {
        AnalysisResult::Spending(r) => print_spending(r),
        AnalysisResult::Budget(r) => print_budget(r),
        AnalysisResult::Anomalies(r) => print_anomalies(r),
        AnalysisResult::Savings(r) => print_savings(r),
    }
}

fn print_spending(r: &SpendingAnalysis) {
    println!("   {}", r.summary);
    for top in &r.top_spending {
        println!(
            "   • {:<14} {:>10.2}  {:>5.1}%",
            top.category, top.amount, top.percentage
        );
    }
    for item in &r.unnecessary_spending {
        println!(
            "   ✂️  {} ({:.2}): {}",
            truncate(&item.description, 40),
            item.amount,
            item.suggestion
        );
    }
    for tip in &r.saving_opportunities {
        println!("   💡 {}", tip);
    }
}

fn print_budget(r: &BudgetSuggestion) {
    println!("   Total budget:   {:.2}", r.total_budget);
    println!("   Savings target: {:.2}", r.savings_target);
    for (category, amount) in &r.category_budgets {
        println!("   • {:<14} {:>10.2}", category, amount);
    }
    for insight in &r.insights {
        println!("   💡 {}", insight);
    }
}

fn print_anomalies(r: &AnomalyReport) {
    if r.anomalies.is_empty() {
        println!("   No unusual transactions");
    }
    for a in &r.anomalies {
        println!(
            "   ⚠️  [{:?}] {} {} ({:.2}): {}",
            a.severity,
            a.date,
            truncate(&a.description, 40),
            a.amount,
            a.reason
        );
    }
    println!("   {}", r.summary);
    println!("   → {}", r.recommendation);
}

fn print_savings(r: &SavingsAdvice) {
    println!("   Required monthly: {:.2}", r.required_monthly_savings);
    println!("   Gap:              {:.2}", r.gap);
    println!("   Feasibility:      {:?}", r.feasibility);
    for s in &r.strategies {
        println!(
            "   • {} (saves {:.2}, {:?})",
            s.action, s.potential_savings, s.difficulty
        );
    }
    for (horizon, amount) in &r.projected_savings {
        println!("   📈 {}: {:.2}", horizon, amount);
    }
    println!("   {}", r.motivation);
}
