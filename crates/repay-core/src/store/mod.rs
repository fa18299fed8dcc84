//! The transaction store: the only I/O boundary of plan generation and
//! debit reconciliation.
//!
//! [`PgTransactionStore`] runs every call inside one database transaction
//! that holds the reconciliation lock. [`InMemoryStore`] keeps rows in a
//! `Vec` and records each batch write, which the plan preview and the tests
//! rely on.

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgTransactionStore;

use anyhow::Result;
use async_trait::async_trait;

use repay_db::models::{Advance, BillingTransaction, Debit, TransactionDirection, TransactionStatus};

/// Queries and writes the reconciliation logic needs from persistence.
#[async_trait]
pub trait TransactionStore: Send {
    /// Funded advances whose account has no debits yet.
    async fn find_advances_without_repayment_plan(&mut self) -> Result<Vec<Advance>>;

    /// Insert or update every row in `transactions` as one batch.
    ///
    /// Implementations write even when the slice is empty; callers that
    /// want a no-op must check first.
    async fn save_all(&mut self, transactions: &[BillingTransaction]) -> Result<()>;

    async fn find_by_status_and_direction(
        &mut self,
        status: TransactionStatus,
        direction: TransactionDirection,
    ) -> Result<Vec<BillingTransaction>>;

    /// An account's debits, ascending by transaction time.
    async fn find_debits_by_account_ordered_by_time(
        &mut self,
        dst_bank_account: &str,
    ) -> Result<Vec<Debit>>;
}
