//! Periodic driver for the reconciliation cycle.
//!
//! [`run_cycle`] is one atomic pass: begin a transaction, take the
//! reconciliation lock, reconcile, commit. [`ReconciliationScheduler`] calls
//! a cycle function on a fixed period and keeps going when a cycle fails.

use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::lifecycle::{CycleReport, DebitLifecycleManager};
use crate::store::PgTransactionStore;

/// Run one reconciliation cycle against the database.
///
/// All reads and writes share one transaction holding the reconciliation
/// advisory lock, so concurrent cycles (in this or another process) run one
/// after the other. On error the transaction is rolled back and nothing
/// from this cycle is kept.
pub async fn run_cycle(pool: &PgPool, manager: &DebitLifecycleManager) -> Result<CycleReport> {
    let mut store = PgTransactionStore::begin_exclusive(pool).await?;

    match manager.reconcile(&mut store, Utc::now()).await {
        Ok(report) => {
            store.commit().await?;
            Ok(report)
        }
        Err(e) => {
            if let Err(rollback_err) = store.rollback().await {
                error!(error = %rollback_err, "rollback after failed cycle also failed");
            }
            Err(e)
        }
    }
}

/// Totals over the lifetime of one [`ReconciliationScheduler::run`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub cycles_run: u64,
    pub cycles_failed: u64,
}

/// Fires a reconciliation cycle every `period` until cancelled.
#[derive(Debug, Clone)]
pub struct ReconciliationScheduler {
    period: Duration,
}

impl ReconciliationScheduler {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Call `cycle` immediately and then once per period.
    ///
    /// A cycle that outlasts the period delays the next one rather than
    /// overlapping it. Errors are logged and swallowed; the next tick is the
    /// retry. Cancellation is checked between cycles, never during one.
    pub async fn run<F, Fut>(&self, cancel: CancellationToken, mut cycle: F) -> SchedulerStats
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<CycleReport>>,
    {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats = SchedulerStats::default();

        info!(period_ms = self.period.as_millis() as u64, "reconciliation scheduler started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let started = Instant::now();
            stats.cycles_run += 1;
            match cycle().await {
                Ok(report) => {
                    info!(
                        plans_created = report.plans_created,
                        debits_created = report.debits_created,
                        advances_reconciled = report.advances_reconciled,
                        advances_skipped = report.advances_skipped,
                        debits_rescheduled = report.debits_rescheduled,
                        debits_promoted = report.debits_promoted,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "reconciliation cycle completed"
                    );
                }
                Err(e) => {
                    stats.cycles_failed += 1;
                    error!(error = %format!("{e:#}"), "reconciliation cycle failed");
                }
            }
        }

        info!(
            cycles_run = stats.cycles_run,
            cycles_failed = stats.cycles_failed,
            "reconciliation scheduler stopped"
        );
        stats
    }
}
