//! Debit lifecycle manager: one reconciliation pass over every funded
//! advance.
//!
//! A pass runs in a fixed order:
//!
//! 1. Generate plans for unplanned advances and save them in one batch.
//! 2. Load every funded advance (`credit`, `success`).
//! 3. For each advance, load its debits by ascending time, then
//!    - move every FAILURE debit to one week before the last scheduled
//!      payment (status stays FAILURE), and
//!    - release the debits picked by the [`PromotionRule`] to
//!      WAITING_TO_BE_SENT.
//!
//! The manager keeps no state between passes. Atomicity and mutual
//! exclusion come from the store it is handed (see
//! [`crate::scheduler::run_cycle`]).

mod promotion;

pub use promotion::PromotionRule;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use repay_db::models::{Advance, Debit, TransactionDirection, TransactionStatus};

use crate::config::RepaymentConfig;
use crate::plan::PlanGenerator;
use crate::store::TransactionStore;

/// What one reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Advances that received a new plan.
    pub plans_created: usize,
    pub debits_created: usize,
    pub advances_reconciled: usize,
    /// Funded advances with no debits at reconciliation time.
    pub advances_skipped: usize,
    pub debits_rescheduled: usize,
    pub debits_promoted: usize,
}

/// Creates repayment plans and moves debits through their lifecycle.
#[derive(Debug, Clone)]
pub struct DebitLifecycleManager {
    planner: PlanGenerator,
    promotion_rule: PromotionRule,
}

impl DebitLifecycleManager {
    pub fn new(planner: PlanGenerator, promotion_rule: PromotionRule) -> Self {
        Self {
            planner,
            promotion_rule,
        }
    }

    pub fn from_config(config: &RepaymentConfig) -> Self {
        Self::new(PlanGenerator::new(config.installments), config.promotion_rule)
    }

    pub fn planner(&self) -> &PlanGenerator {
        &self.planner
    }

    pub fn promotion_rule(&self) -> PromotionRule {
        self.promotion_rule
    }

    /// Run one full pass against `store`, treating `now` as the current
    /// time. The first error aborts the pass.
    pub async fn reconcile<S>(&self, store: &mut S, now: DateTime<Utc>) -> Result<CycleReport>
    where
        S: TransactionStore + ?Sized,
    {
        let mut report = CycleReport::default();

        let (plans, debits) = self.create_and_persist_new_plans(store).await?;
        report.plans_created = plans;
        report.debits_created = debits;

        for advance in fetch_funded_advances(store).await? {
            match self.handle_advance_debits(store, &advance, now).await? {
                Some((rescheduled, promoted)) => {
                    report.advances_reconciled += 1;
                    report.debits_rescheduled += rescheduled;
                    report.debits_promoted += promoted;
                }
                None => report.advances_skipped += 1,
            }
        }

        Ok(report)
    }

    /// Returns `(plans, debits)` created.
    async fn create_and_persist_new_plans<S>(&self, store: &mut S) -> Result<(usize, usize)>
    where
        S: TransactionStore + ?Sized,
    {
        let debits = self
            .planner
            .generate_plans_for_unplanned_advances(store)
            .await
            .context("failed to generate repayment plans")?;

        if debits.is_empty() {
            debug!("no new repayment plans to save");
            return Ok((0, 0));
        }

        store
            .save_all(&debits)
            .await
            .context("failed to save new repayment plans")?;

        let plans = debits.len() / self.planner.installments().get() as usize;
        info!(plans, debits = debits.len(), "saved new repayment plans");
        Ok((plans, debits.len()))
    }

    /// Returns `None` when the advance has no debits to reconcile, otherwise
    /// `(rescheduled, promoted)` counts.
    async fn handle_advance_debits<S>(
        &self,
        store: &mut S,
        advance: &Advance,
        now: DateTime<Utc>,
    ) -> Result<Option<(usize, usize)>>
    where
        S: TransactionStore + ?Sized,
    {
        let account = advance.dst_bank_account.as_str();
        let mut debits = store
            .find_debits_by_account_ordered_by_time(account)
            .await
            .with_context(|| format!("failed to load debits for account {account}"))?;

        let Some(target) = week_before_last_payment(&debits)? else {
            warn!(
                account,
                advance_id = %advance.id,
                "funded advance has no debits, skipping reconciliation"
            );
            return Ok(None);
        };

        let rescheduled = reschedule_failed_debits(store, &mut debits, target).await?;
        let promoted = self.promote_due_debits(store, &mut debits, now).await?;
        Ok(Some((rescheduled, promoted)))
    }

    /// Release the debits selected by the promotion rule.
    ///
    /// The batch is written even when nothing was selected.
    async fn promote_due_debits<S>(
        &self,
        store: &mut S,
        debits: &mut [Debit],
        now: DateTime<Utc>,
    ) -> Result<usize>
    where
        S: TransactionStore + ?Sized,
    {
        let mut to_perform = Vec::new();
        for debit in debits.iter_mut() {
            if self.promotion_rule.selects(debit, now) {
                debit.status = TransactionStatus::WaitingToBeSent;
                to_perform.push(debit.clone());
            }
        }

        store
            .save_all(&to_perform)
            .await
            .context("failed to save debits released for sending")?;

        for debit in &to_perform {
            info!(
                debit_id = %debit.id,
                account = %debit.dst_bank_account,
                amount = debit.amount,
                "debit needs to be performed, status set to waiting_to_be_sent"
            );
        }
        Ok(to_perform.len())
    }
}

async fn fetch_funded_advances<S>(store: &mut S) -> Result<Vec<Advance>>
where
    S: TransactionStore + ?Sized,
{
    store
        .find_by_status_and_direction(TransactionStatus::Success, TransactionDirection::Credit)
        .await
        .context("failed to load funded advances")
}

/// One week before the latest scheduled debit, whatever its status.
/// `debits` must be ordered by ascending time. `Ok(None)` when there are no
/// debits; an error when the result is before the earliest representable
/// time.
pub fn week_before_last_payment(debits: &[Debit]) -> Result<Option<DateTime<Utc>>> {
    let Some(last) = debits.last() else {
        return Ok(None);
    };
    last.transaction_time
        .checked_sub_signed(Duration::weeks(1))
        .map(Some)
        .with_context(|| {
            format!(
                "cannot reschedule before debit {} at {}: out of range",
                last.id, last.transaction_time
            )
        })
}

/// Move every FAILURE debit to `target`. Only writes when at least one debit
/// failed.
async fn reschedule_failed_debits<S>(
    store: &mut S,
    debits: &mut [Debit],
    target: DateTime<Utc>,
) -> Result<usize>
where
    S: TransactionStore + ?Sized,
{
    let mut failed = Vec::new();
    for debit in debits.iter_mut() {
        if debit.status == TransactionStatus::Failure {
            debit.transaction_time = target;
            failed.push(debit.clone());
        }
    }

    if failed.is_empty() {
        return Ok(0);
    }

    store
        .save_all(&failed)
        .await
        .context("failed to save rescheduled debits")?;

    for debit in &failed {
        info!(
            debit_id = %debit.id,
            account = %debit.dst_bank_account,
            amount = debit.amount,
            rescheduled_to = %debit.transaction_time,
            "failed debit moved to one week before the last payment"
        );
    }
    Ok(failed.len())
}
