//! `repay run` and `repay cycle`: drive the reconciliation cycle.

use anyhow::Result;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use repay_core::config::RepaymentConfig;
use repay_core::lifecycle::{CycleReport, DebitLifecycleManager};
use repay_core::scheduler::{ReconciliationScheduler, run_cycle};
use repay_db::queries::transactions as db;

/// Run the scheduler until Ctrl+C.
///
/// A cycle in progress when the signal arrives finishes (and commits)
/// before the scheduler stops.
pub async fn run_daemon(pool: &PgPool, config: &RepaymentConfig) -> Result<()> {
    let manager = DebitLifecycleManager::from_config(config);
    let scheduler = ReconciliationScheduler::new(config.cycle_period);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown requested"),
            Err(e) => warn!(error = %e, "failed to listen for Ctrl+C; stopping"),
        }
        signal_cancel.cancel();
    });

    info!(
        installments = config.installments.get(),
        promotion_rule = %config.promotion_rule,
        "starting reconciliation"
    );

    let stats = scheduler
        .run(cancel, || run_cycle(pool, &manager))
        .await;

    println!(
        "Stopped after {} cycle(s), {} failed.",
        stats.cycles_run, stats.cycles_failed
    );
    Ok(())
}

/// Run exactly one cycle and print what it changed.
pub async fn run_once(pool: &PgPool, config: &RepaymentConfig, json: bool) -> Result<()> {
    let manager = DebitLifecycleManager::from_config(config);
    let report = run_cycle(pool, &manager).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_report(&report);
    let counts = db::debit_status_counts(pool).await?;
    if !counts.is_empty() {
        println!();
        println!("Debits by status:");
        for (status, count) in &counts {
            println!("  {status:<18} {count}");
        }
    }
    Ok(())
}

fn print_report(report: &CycleReport) {
    println!("Reconciliation cycle complete.");
    println!(
        "  plans created:       {} ({} debits)",
        report.plans_created, report.debits_created
    );
    println!("  advances reconciled: {}", report.advances_reconciled);
    if report.advances_skipped > 0 {
        println!("  advances skipped:    {} (no debits)", report.advances_skipped);
    }
    println!("  debits rescheduled:  {}", report.debits_rescheduled);
    println!("  debits released:     {}", report.debits_promoted);
}
