//! `repay debits` and `repay settle`: inspect debits and record performer
//! outcomes.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use repay_core::state::DebitStateMachine;
use repay_db::models::TransactionStatus;
use repay_db::queries::transactions as db;

use crate::Outcome;

/// List an account's debits in time order.
pub async fn run_debits(pool: &PgPool, account: &str, json: bool) -> Result<()> {
    let debits = db::list_debits_for_account(pool, account).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&debits)?);
        return Ok(());
    }

    if debits.is_empty() {
        println!("No debits for account {account}.");
        return Ok(());
    }

    println!("Debits for {account}:");
    for d in &debits {
        let icon = match d.status {
            TransactionStatus::OnHold => ".",
            TransactionStatus::WaitingToBeSent => ">",
            TransactionStatus::Success => "+",
            TransactionStatus::Failure => "!",
        };
        println!(
            "  [{icon}] {}  {:>10}  {:<18}  {}",
            d.transaction_time.format("%Y-%m-%d %H:%M"),
            d.amount,
            d.status,
            d.id
        );
    }

    let total: i64 = debits.iter().map(|d| d.amount).sum();
    let collected: i64 = debits
        .iter()
        .filter(|d| d.status == TransactionStatus::Success)
        .map(|d| d.amount)
        .sum();
    println!();
    println!("Collected {collected} of {total}.");
    Ok(())
}

/// Record the Transaction Performer's result for a released debit.
pub async fn run_settle(pool: &PgPool, debit_id: &str, outcome: Outcome) -> Result<()> {
    let id =
        Uuid::parse_str(debit_id).with_context(|| format!("invalid debit ID: {debit_id}"))?;
    let status = TransactionStatus::from(outcome);

    DebitStateMachine::record_outcome(pool, id, status).await?;

    println!("Debit {id} marked {status}.");
    Ok(())
}
