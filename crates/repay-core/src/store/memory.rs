use anyhow::{Result, bail};
use async_trait::async_trait;

use repay_db::models::{Advance, BillingTransaction, Debit, TransactionDirection, TransactionStatus};

use super::TransactionStore;

/// A [`TransactionStore`] over an in-process `Vec`.
///
/// Query semantics mirror the PostgreSQL store: funded advances are `credit`
/// rows with status `success`, and an account counts as planned once it has
/// any `debit` row. Every `save_all` call is recorded, empty ones included.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    rows: Vec<BillingTransaction>,
    save_calls: Vec<Vec<BillingTransaction>>,
    fail_next_save: Option<String>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transactions(rows: impl IntoIterator<Item = BillingTransaction>) -> Self {
        Self {
            rows: rows.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Add a row directly, without recording a write.
    pub fn insert(&mut self, row: BillingTransaction) {
        self.upsert(row);
    }

    pub fn transactions(&self) -> &[BillingTransaction] {
        &self.rows
    }

    /// Debits for `account` in time order.
    pub fn debits_for(&self, account: &str) -> Vec<Debit> {
        let mut debits: Vec<Debit> = self
            .rows
            .iter()
            .filter(|t| t.direction == TransactionDirection::Debit && t.dst_bank_account == account)
            .cloned()
            .collect();
        sort_by_time(&mut debits);
        debits
    }

    /// Batches passed to `save_all`, in call order.
    pub fn save_calls(&self) -> &[Vec<BillingTransaction>] {
        &self.save_calls
    }

    pub fn clear_save_calls(&mut self) {
        self.save_calls.clear();
    }

    /// Make the next `save_all` fail with `message` without writing.
    pub fn fail_next_save(&mut self, message: impl Into<String>) {
        self.fail_next_save = Some(message.into());
    }

    fn upsert(&mut self, row: BillingTransaction) {
        match self.rows.iter_mut().find(|t| t.id == row.id) {
            Some(existing) => *existing = row,
            None => self.rows.push(row),
        }
    }

    fn has_debits(&self, account: &str) -> bool {
        self.rows
            .iter()
            .any(|t| t.direction == TransactionDirection::Debit && t.dst_bank_account == account)
    }
}

fn sort_by_time(rows: &mut [BillingTransaction]) {
    rows.sort_by(|a, b| {
        a.transaction_time
            .cmp(&b.transaction_time)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn find_advances_without_repayment_plan(&mut self) -> Result<Vec<Advance>> {
        let mut advances: Vec<Advance> = self
            .rows
            .iter()
            .filter(|t| t.is_funded_advance() && !self.has_debits(&t.dst_bank_account))
            .cloned()
            .collect();
        sort_by_time(&mut advances);
        Ok(advances)
    }

    async fn save_all(&mut self, transactions: &[BillingTransaction]) -> Result<()> {
        if let Some(message) = self.fail_next_save.take() {
            bail!(message);
        }
        self.save_calls.push(transactions.to_vec());
        for row in transactions {
            self.upsert(row.clone());
        }
        Ok(())
    }

    async fn find_by_status_and_direction(
        &mut self,
        status: TransactionStatus,
        direction: TransactionDirection,
    ) -> Result<Vec<BillingTransaction>> {
        let mut rows: Vec<BillingTransaction> = self
            .rows
            .iter()
            .filter(|t| t.status == status && t.direction == direction)
            .cloned()
            .collect();
        sort_by_time(&mut rows);
        Ok(rows)
    }

    async fn find_debits_by_account_ordered_by_time(
        &mut self,
        dst_bank_account: &str,
    ) -> Result<Vec<Debit>> {
        Ok(self.debits_for(dst_bank_account))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    #[tokio::test]
    async fn advances_with_debits_are_not_unplanned() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let planned = BillingTransaction::new_advance("A", 100, t0);
        let unplanned = BillingTransaction::new_advance("B", 100, t0);
        let debit = BillingTransaction::new_debit("A", 50, t0 + Duration::weeks(1));
        let mut store = InMemoryStore::with_transactions([planned, unplanned.clone(), debit]);

        let found = store.find_advances_without_repayment_plan().await.unwrap();
        assert_eq!(found, vec![unplanned]);
    }

    #[tokio::test]
    async fn save_all_upserts_and_records_the_batch() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut debit = BillingTransaction::new_debit("A", 50, t0);
        let mut store = InMemoryStore::with_transactions([debit.clone()]);

        debit.status = TransactionStatus::Failure;
        store.save_all(std::slice::from_ref(&debit)).await.unwrap();
        store.save_all(&[]).await.unwrap();

        assert_eq!(store.transactions(), &[debit.clone()]);
        assert_eq!(store.save_calls(), &[vec![debit], vec![]]);
    }

    #[tokio::test]
    async fn failed_save_writes_nothing() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut store = InMemoryStore::new();
        store.fail_next_save("disk full");

        let err = store
            .save_all(&[BillingTransaction::new_debit("A", 50, t0)])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "disk full");
        assert!(store.transactions().is_empty());
        assert!(store.save_calls().is_empty());

        // Only the next save fails.
        store
            .save_all(&[BillingTransaction::new_debit("A", 50, t0)])
            .await
            .unwrap();
        assert_eq!(store.transactions().len(), 1);
    }

    #[tokio::test]
    async fn debits_are_returned_in_time_order() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let late = BillingTransaction::new_debit("A", 1, t0 + Duration::weeks(2));
        let early = BillingTransaction::new_debit("A", 1, t0 + Duration::weeks(1));
        let mut store = InMemoryStore::with_transactions([late.clone(), early.clone()]);

        let debits = store.find_debits_by_account_ordered_by_time("A").await.unwrap();
        assert_eq!(debits, vec![early, late]);
    }
}
