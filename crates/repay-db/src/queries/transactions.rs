//! Database query functions for the `transactions` table.
//!
//! Every function takes any Postgres executor so the same queries serve a
//! plain pool (CLI listings) and an open transaction (the reconciliation
//! cycle).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgExecutor;
use uuid::Uuid;

use crate::models::{BillingTransaction, TransactionDirection, TransactionStatus};

const COLUMNS: &str = "id, dst_bank_account, amount, transaction_time, direction, status";

/// Advisory lock key held for the duration of one reconciliation cycle.
pub const RECONCILIATION_LOCK_KEY: i64 = 0x7265_7061_7900;

/// Insert a funded advance (`credit`, `success`).
pub async fn insert_advance<'e, E: PgExecutor<'e>>(
    db: E,
    dst_bank_account: &str,
    amount: i64,
    transaction_time: DateTime<Utc>,
) -> Result<BillingTransaction> {
    let advance = BillingTransaction::new_advance(dst_bank_account, amount, transaction_time);
    let row = sqlx::query_as::<_, BillingTransaction>(&format!(
        "INSERT INTO transactions ({COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {COLUMNS}"
    ))
    .bind(advance.id)
    .bind(&advance.dst_bank_account)
    .bind(advance.amount)
    .bind(advance.transaction_time)
    .bind(advance.direction)
    .bind(advance.status)
    .fetch_one(db)
    .await
    .context("failed to insert advance")?;

    Ok(row)
}

/// Fetch a single transaction by id.
pub async fn get_transaction<'e, E: PgExecutor<'e>>(
    db: E,
    id: Uuid,
) -> Result<Option<BillingTransaction>> {
    let row = sqlx::query_as::<_, BillingTransaction>(&format!(
        "SELECT {COLUMNS} FROM transactions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await
    .context("failed to fetch transaction")?;

    Ok(row)
}

/// Funded advances whose account has no debit rows yet.
///
/// This is what keeps plan creation at-most-once per account: as soon as a
/// single debit exists for the account, its advance drops out of this set.
pub async fn find_advances_without_repayment_plan<'e, E: PgExecutor<'e>>(
    db: E,
) -> Result<Vec<BillingTransaction>> {
    let rows = sqlx::query_as::<_, BillingTransaction>(&format!(
        "SELECT {COLUMNS} FROM transactions a \
         WHERE a.direction = 'credit' \
           AND a.status = 'success' \
           AND NOT EXISTS ( \
               SELECT 1 FROM transactions d \
               WHERE d.direction = 'debit' \
                 AND d.dst_bank_account = a.dst_bank_account \
           ) \
         ORDER BY a.transaction_time ASC, a.id ASC"
    ))
    .fetch_all(db)
    .await
    .context("failed to find advances without repayment plan")?;

    Ok(rows)
}

/// All transactions with the given status and direction, oldest first.
pub async fn find_by_status_and_direction<'e, E: PgExecutor<'e>>(
    db: E,
    status: TransactionStatus,
    direction: TransactionDirection,
) -> Result<Vec<BillingTransaction>> {
    let rows = sqlx::query_as::<_, BillingTransaction>(&format!(
        "SELECT {COLUMNS} FROM transactions \
         WHERE status = $1 AND direction = $2 \
         ORDER BY transaction_time ASC, id ASC"
    ))
    .bind(status)
    .bind(direction)
    .fetch_all(db)
    .await
    .with_context(|| format!("failed to find {direction} transactions with status {status}"))?;

    Ok(rows)
}

/// Debits for an account in ascending time order, locked `FOR UPDATE`.
///
/// Callers rely on the ordering: the last element is the latest scheduled
/// payment. The row locks are held until the surrounding transaction ends.
/// Read-only callers use [`list_debits_for_account`] instead.
pub async fn find_debits_by_account_ordered_by_time<'e, E: PgExecutor<'e>>(
    db: E,
    dst_bank_account: &str,
) -> Result<Vec<BillingTransaction>> {
    fetch_account_debits(db, dst_bank_account, true).await
}

/// Same rows and order as [`find_debits_by_account_ordered_by_time`],
/// without row locks; never waits on a running reconciliation cycle.
pub async fn list_debits_for_account<'e, E: PgExecutor<'e>>(
    db: E,
    dst_bank_account: &str,
) -> Result<Vec<BillingTransaction>> {
    fetch_account_debits(db, dst_bank_account, false).await
}

async fn fetch_account_debits<'e, E: PgExecutor<'e>>(
    db: E,
    dst_bank_account: &str,
    for_update: bool,
) -> Result<Vec<BillingTransaction>> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let rows = sqlx::query_as::<_, BillingTransaction>(&format!(
        "SELECT {COLUMNS} FROM transactions \
         WHERE direction = 'debit' AND dst_bank_account = $1 \
         ORDER BY transaction_time ASC, id ASC{lock}"
    ))
    .bind(dst_bank_account)
    .fetch_all(db)
    .await
    .with_context(|| format!("failed to fetch debits for account {dst_bank_account}"))?;

    Ok(rows)
}

/// Insert-or-update a batch of rows in one statement, keyed by `id`.
///
/// Returns the number of rows written. An empty slice still issues the
/// statement; skipping empty batches is the caller's decision.
pub async fn save_all<'e, E: PgExecutor<'e>>(
    db: E,
    transactions: &[BillingTransaction],
) -> Result<u64> {
    let mut ids = Vec::with_capacity(transactions.len());
    let mut accounts = Vec::with_capacity(transactions.len());
    let mut amounts = Vec::with_capacity(transactions.len());
    let mut times = Vec::with_capacity(transactions.len());
    let mut directions = Vec::with_capacity(transactions.len());
    let mut statuses = Vec::with_capacity(transactions.len());
    for t in transactions {
        ids.push(t.id);
        accounts.push(t.dst_bank_account.clone());
        amounts.push(t.amount);
        times.push(t.transaction_time);
        directions.push(t.direction.to_string());
        statuses.push(t.status.to_string());
    }

    let result = sqlx::query(
        "INSERT INTO transactions (id, dst_bank_account, amount, transaction_time, direction, status) \
         SELECT * FROM UNNEST($1::uuid[], $2::text[], $3::bigint[], $4::timestamptz[], $5::text[], $6::text[]) \
         ON CONFLICT (id) DO UPDATE \
         SET dst_bank_account = EXCLUDED.dst_bank_account, \
             amount = EXCLUDED.amount, \
             transaction_time = EXCLUDED.transaction_time, \
             direction = EXCLUDED.direction, \
             status = EXCLUDED.status, \
             updated_at = now()",
    )
    .bind(ids)
    .bind(accounts)
    .bind(amounts)
    .bind(times)
    .bind(directions)
    .bind(statuses)
    .execute(db)
    .await
    .with_context(|| format!("failed to save batch of {} transactions", transactions.len()))?;

    Ok(result.rows_affected())
}

/// Record the performer's outcome for a debit that was released for
/// sending.
///
/// Only `waiting_to_be_sent` debits are updated; returns the number of rows
/// affected (0 means the debit is missing or not awaiting an outcome).
pub async fn record_debit_outcome<'e, E: PgExecutor<'e>>(
    db: E,
    id: Uuid,
    outcome: TransactionStatus,
) -> Result<u64> {
    if !outcome.is_terminal() {
        anyhow::bail!("{outcome} is not a performer outcome (expected success or failure)");
    }

    let result = sqlx::query(
        "UPDATE transactions \
         SET status = $1, updated_at = now() \
         WHERE id = $2 AND direction = 'debit' AND status = 'waiting_to_be_sent'",
    )
    .bind(outcome)
    .bind(id)
    .execute(db)
    .await
    .context("failed to record debit outcome")?;

    Ok(result.rows_affected())
}

/// Take the transaction-scoped reconciliation lock, blocking until any other
/// cycle holding it commits or rolls back.
pub async fn lock_reconciliation<'e, E: PgExecutor<'e>>(db: E) -> Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(RECONCILIATION_LOCK_KEY)
        .execute(db)
        .await
        .context("failed to acquire reconciliation lock")?;

    Ok(())
}

/// Debit counts per status, across all accounts.
pub async fn debit_status_counts<'e, E: PgExecutor<'e>>(
    db: E,
) -> Result<Vec<(TransactionStatus, i64)>> {
    let rows: Vec<(TransactionStatus, i64)> = sqlx::query_as(
        "SELECT status, COUNT(*) FROM transactions \
         WHERE direction = 'debit' \
         GROUP BY status \
         ORDER BY status",
    )
    .fetch_all(db)
    .await
    .context("failed to count debits by status")?;

    Ok(rows)
}
