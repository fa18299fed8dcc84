//! Repayment plan generation.
//!
//! A plan for an advance is `N` equal weekly debits, the first one week
//! after the advance was funded. Amounts are integer minor units divided
//! with truncation; the remainder is not redistributed, so a plan can sum to
//! slightly less than the advance.

use anyhow::{Context, Result};
use chrono::Duration;
use tracing::{debug, info};

use repay_db::models::{Advance, BillingTransaction, Debit};

use crate::config::InstallmentCount;
use crate::store::TransactionStore;

/// Builds repayment plans for funded advances that do not have one.
#[derive(Debug, Clone, Copy)]
pub struct PlanGenerator {
    installments: InstallmentCount,
}

impl PlanGenerator {
    pub fn new(installments: InstallmentCount) -> Self {
        Self { installments }
    }

    pub fn installments(&self) -> InstallmentCount {
        self.installments
    }

    /// Amount of a single installment for an advance of `total`.
    pub fn installment_amount(&self, total: i64) -> i64 {
        total / i64::from(self.installments.get())
    }

    /// The debits that make up the plan for `advance`, in ON_HOLD state
    /// with fresh ids. Nothing is persisted.
    ///
    /// Fails if a due date falls outside the representable time range.
    pub fn plan_for_advance(&self, advance: &Advance) -> Result<Vec<Debit>> {
        let amount = self.installment_amount(advance.amount);
        (1..=i64::from(self.installments.get()))
            .map(|week| -> Result<Debit> {
                let due = advance
                    .transaction_time
                    .checked_add_signed(Duration::weeks(week))
                    .with_context(|| {
                        format!(
                            "installment {week} of advance {} funded at {} is out of range",
                            advance.id, advance.transaction_time
                        )
                    })?;
                Ok(BillingTransaction::new_debit(
                    advance.dst_bank_account.clone(),
                    amount,
                    due,
                ))
            })
            .collect()
    }

    /// Plans for every advance the store reports as unplanned, concatenated
    /// in the store's order.
    ///
    /// The store query is what keeps this at-most-once per account; calling
    /// this twice before persisting yields two independent plans.
    pub async fn generate_plans_for_unplanned_advances<S>(&self, store: &mut S) -> Result<Vec<Debit>>
    where
        S: TransactionStore + ?Sized,
    {
        let advances = store.find_advances_without_repayment_plan().await?;
        debug!(count = advances.len(), "advances without a repayment plan");

        let mut debits = Vec::with_capacity(advances.len() * self.installments.get() as usize);
        for advance in &advances {
            let plan = self.plan_for_advance(advance)?;
            info!(
                account = %advance.dst_bank_account,
                total = advance.amount,
                installments = self.installments.get(),
                installment_amount = self.installment_amount(advance.amount),
                "created repayment plan"
            );
            debits.extend(plan);
        }
        Ok(debits)
    }
}
