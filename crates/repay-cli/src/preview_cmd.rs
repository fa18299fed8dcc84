//! `repay preview`: show the plan an advance would get, without a database.

use anyhow::Result;
use chrono::{DateTime, Utc};

use repay_core::plan::PlanGenerator;
use repay_core::store::InMemoryStore;
use repay_db::models::{BillingTransaction, Debit};

const PREVIEW_ACCOUNT: &str = "preview";

/// Generate the plan through the same path a cycle uses, against an
/// in-memory store holding only this advance.
pub async fn build_preview(
    planner: &PlanGenerator,
    amount: i64,
    funded_at: DateTime<Utc>,
) -> Result<Vec<Debit>> {
    let mut store = InMemoryStore::with_transactions([BillingTransaction::new_advance(
        PREVIEW_ACCOUNT,
        amount,
        funded_at,
    )]);
    planner.generate_plans_for_unplanned_advances(&mut store).await
}

pub async fn run_preview(
    planner: &PlanGenerator,
    amount: i64,
    funded_at: DateTime<Utc>,
    json: bool,
) -> Result<()> {
    if amount <= 0 {
        anyhow::bail!("advance amount must be positive, got {amount}");
    }

    let plan = build_preview(planner, amount, funded_at).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!(
        "Plan for an advance of {amount} funded {}:",
        funded_at.format("%Y-%m-%d %H:%M UTC")
    );
    for (week, debit) in (1..).zip(&plan) {
        println!(
            "  week {week:>2}  {}  {:>10}",
            debit.transaction_time.format("%Y-%m-%d"),
            debit.amount
        );
    }
    let planned: i64 = plan.iter().map(|d| d.amount).sum();
    if planned != amount {
        println!("  ({} not collected by the plan)", amount - planned);
    }
    Ok(())
}
