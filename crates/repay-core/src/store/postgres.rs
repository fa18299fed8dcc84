use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use repay_db::models::{Advance, BillingTransaction, Debit, TransactionDirection, TransactionStatus};
use repay_db::queries::transactions as db;

use super::TransactionStore;

/// A [`TransactionStore`] bound to one open database transaction.
///
/// Created by [`Self::begin_exclusive`], which also takes the
/// reconciliation advisory lock, so two stores never mutate debits at the
/// same time. Dropping the store without [`Self::commit`] rolls back every
/// write made through it.
pub struct PgTransactionStore {
    tx: Transaction<'static, Postgres>,
}

impl PgTransactionStore {
    /// Begin a transaction and block until the reconciliation lock is held.
    pub async fn begin_exclusive(pool: &PgPool) -> Result<Self> {
        let mut tx = pool
            .begin()
            .await
            .context("failed to begin reconciliation transaction")?;
        db::lock_reconciliation(&mut *tx).await?;
        debug!("reconciliation lock acquired");
        Ok(Self { tx })
    }

    pub async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .context("failed to commit reconciliation transaction")
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx
            .rollback()
            .await
            .context("failed to roll back reconciliation transaction")
    }
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn find_advances_without_repayment_plan(&mut self) -> Result<Vec<Advance>> {
        db::find_advances_without_repayment_plan(&mut *self.tx).await
    }

    async fn save_all(&mut self, transactions: &[BillingTransaction]) -> Result<()> {
        db::save_all(&mut *self.tx, transactions).await?;
        Ok(())
    }

    async fn find_by_status_and_direction(
        &mut self,
        status: TransactionStatus,
        direction: TransactionDirection,
    ) -> Result<Vec<BillingTransaction>> {
        db::find_by_status_and_direction(&mut *self.tx, status, direction).await
    }

    async fn find_debits_by_account_ordered_by_time(
        &mut self,
        dst_bank_account: &str,
    ) -> Result<Vec<Debit>> {
        db::find_debits_by_account_ordered_by_time(&mut *self.tx, dst_bank_account).await
    }
}
