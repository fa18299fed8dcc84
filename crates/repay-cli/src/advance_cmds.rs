//! `repay advance` subcommands: record and list funded advances.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use repay_db::models::{TransactionDirection, TransactionStatus};
use repay_db::queries::transactions as db;

use crate::AdvanceCommands;

pub async fn run_advance_command(command: AdvanceCommands, pool: &PgPool) -> Result<()> {
    match command {
        AdvanceCommands::Record {
            account,
            amount,
            at,
        } => cmd_record(pool, &account, amount, at).await,
        AdvanceCommands::List { json } => cmd_list(pool, json).await,
    }
}

/// Insert a funded advance. The next cycle plans it.
async fn cmd_record(
    pool: &PgPool,
    account: &str,
    amount: i64,
    at: Option<DateTime<Utc>>,
) -> Result<()> {
    if amount <= 0 {
        anyhow::bail!("advance amount must be positive, got {amount}");
    }

    let advance = db::insert_advance(pool, account, amount, at.unwrap_or_else(Utc::now))
        .await
        .with_context(|| format!("failed to record advance for {account}"))?;

    println!("Advance recorded: {}", advance.id);
    println!("  account: {}", advance.dst_bank_account);
    println!("  amount:  {}", advance.amount);
    println!(
        "  funded:  {}",
        advance.transaction_time.format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}

async fn cmd_list(pool: &PgPool, json: bool) -> Result<()> {
    let advances =
        db::find_by_status_and_direction(pool, TransactionStatus::Success, TransactionDirection::Credit)
            .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&advances)?);
        return Ok(());
    }

    if advances.is_empty() {
        println!("No funded advances.");
        return Ok(());
    }

    println!("{:<36}  {:<20}  {:>12}  FUNDED", "ID", "ACCOUNT", "AMOUNT");
    for a in &advances {
        println!(
            "{:<36}  {:<20}  {:>12}  {}",
            a.id,
            a.dst_bank_account,
            a.amount,
            a.transaction_time.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}
