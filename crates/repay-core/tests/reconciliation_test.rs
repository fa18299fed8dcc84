//! Reconciliation cycles against a real database.
//!
//! Each test runs against its own temporary database on the shared test
//! PostgreSQL (see `repay-test-utils`).

use chrono::{Duration, Utc};
use sqlx::PgPool;

use repay_core::config::RepaymentConfig;
use repay_core::lifecycle::{DebitLifecycleManager, PromotionRule};
use repay_core::scheduler::run_cycle;
use repay_db::models::{BillingTransaction, Debit, TransactionStatus};
use repay_db::queries::transactions as db;
use repay_test_utils::{create_test_db, drop_test_db};

fn manager(installments: i64, rule: PromotionRule) -> DebitLifecycleManager {
    let config = RepaymentConfig::new(installments, 60_000, rule).expect("valid config");
    DebitLifecycleManager::from_config(&config)
}

async fn debits(pool: &PgPool, account: &str) -> Vec<Debit> {
    let mut conn = pool.acquire().await.expect("acquire");
    db::find_debits_by_account_ordered_by_time(&mut *conn, account)
        .await
        .expect("load debits")
}

#[tokio::test]
async fn first_cycle_creates_plan_for_new_advance() {
    let (pool, db_name) = create_test_db().await;
    let funded_at = Utc::now();
    db::insert_advance(&pool, "ACC-1", 300, funded_at)
        .await
        .expect("insert advance");

    let report = run_cycle(&pool, &manager(3, PromotionRule::Due))
        .await
        .expect("cycle");

    assert_eq!(report.plans_created, 1);
    assert_eq!(report.debits_created, 3);
    assert_eq!(report.advances_reconciled, 1);
    assert_eq!(report.debits_promoted, 0, "nothing is due yet");

    let plan = debits(&pool, "ACC-1").await;
    assert_eq!(plan.len(), 3);
    for (week, debit) in (1..).zip(&plan) {
        assert_eq!(debit.amount, 100);
        assert_eq!(debit.status, TransactionStatus::OnHold);
        let expected = funded_at + Duration::weeks(week);
        let drift = (debit.transaction_time - expected).num_milliseconds().abs();
        assert!(drift < 1, "week {week} debit off by {drift}ms");
    }

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn second_cycle_does_not_duplicate_plan() {
    let (pool, db_name) = create_test_db().await;
    db::insert_advance(&pool, "ACC-1", 400, Utc::now())
        .await
        .expect("insert advance");
    let m = manager(4, PromotionRule::Due);

    run_cycle(&pool, &m).await.expect("first cycle");
    let second = run_cycle(&pool, &m).await.expect("second cycle");

    assert_eq!(second.plans_created, 0);
    assert_eq!(debits(&pool, "ACC-1").await.len(), 4);

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn due_debits_are_released_for_sending() {
    let (pool, db_name) = create_test_db().await;
    // Weeks 1 and 2 are in the past, week 3 is not.
    db::insert_advance(&pool, "ACC-1", 300, Utc::now() - Duration::days(15))
        .await
        .expect("insert advance");

    let report = run_cycle(&pool, &manager(3, PromotionRule::Due))
        .await
        .expect("cycle");
    assert_eq!(report.debits_promoted, 2);

    let statuses: Vec<_> = debits(&pool, "ACC-1").await.iter().map(|d| d.status).collect();
    assert_eq!(
        statuses,
        vec![
            TransactionStatus::WaitingToBeSent,
            TransactionStatus::WaitingToBeSent,
            TransactionStatus::OnHold
        ]
    );

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn observed_rule_releases_future_debits() {
    let (pool, db_name) = create_test_db().await;
    db::insert_advance(&pool, "ACC-1", 300, Utc::now() - Duration::days(15))
        .await
        .expect("insert advance");

    let report = run_cycle(&pool, &manager(3, PromotionRule::Observed))
        .await
        .expect("cycle");
    assert_eq!(report.debits_promoted, 1);

    let statuses: Vec<_> = debits(&pool, "ACC-1").await.iter().map(|d| d.status).collect();
    assert_eq!(
        statuses,
        vec![
            TransactionStatus::OnHold,
            TransactionStatus::OnHold,
            TransactionStatus::WaitingToBeSent
        ]
    );

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn failed_debit_moves_to_week_before_last_payment() {
    let (pool, db_name) = create_test_db().await;
    let now = Utc::now();
    db::insert_advance(&pool, "ACC-1", 300, now - Duration::weeks(4))
        .await
        .expect("insert advance");

    let future = now + Duration::weeks(10);
    let mut failed = BillingTransaction::new_debit("ACC-1", 100, now - Duration::weeks(3));
    failed.status = TransactionStatus::Failure;
    let ok = {
        let mut d = BillingTransaction::new_debit("ACC-1", 100, now - Duration::weeks(2));
        d.status = TransactionStatus::Success;
        d
    };
    let last = BillingTransaction::new_debit("ACC-1", 100, future);
    db::save_all(&pool, &[failed.clone(), ok, last])
        .await
        .expect("seed plan");

    let report = run_cycle(&pool, &manager(3, PromotionRule::Due))
        .await
        .expect("cycle");
    assert_eq!(report.plans_created, 0);
    assert_eq!(report.debits_rescheduled, 1);

    let moved = db::get_transaction(&pool, failed.id)
        .await
        .expect("get")
        .expect("failed debit still exists");
    assert_eq!(moved.status, TransactionStatus::Failure);
    let expected = future - Duration::weeks(1);
    assert!((moved.transaction_time - expected).num_milliseconds().abs() < 1);

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn concurrent_cycles_create_one_plan() {
    let (pool, db_name) = create_test_db().await;
    db::insert_advance(&pool, "ACC-1", 300, Utc::now())
        .await
        .expect("insert advance");
    let m = manager(3, PromotionRule::Due);

    let (a, b) = tokio::join!(run_cycle(&pool, &m), run_cycle(&pool, &m));
    let (a, b) = (a.expect("cycle a"), b.expect("cycle b"));

    assert_eq!(a.plans_created + b.plans_created, 1);
    assert_eq!(debits(&pool, "ACC-1").await.len(), 3);

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn failed_cycle_leaves_no_partial_writes() {
    let (pool, db_name) = create_test_db().await;
    db::insert_advance(&pool, "ACC-1", 300, Utc::now())
        .await
        .expect("insert advance");
    sqlx::query("ALTER TABLE transactions ADD CONSTRAINT no_large_debits CHECK (direction = 'credit' OR amount < 50)")
        .execute(&pool)
        .await
        .expect("add constraint");

    let result = run_cycle(&pool, &manager(3, PromotionRule::Due)).await;
    assert!(result.is_err(), "saving 100-unit debits must violate the constraint");
    assert!(debits(&pool, "ACC-1").await.is_empty());

    drop_test_db(&db_name).await;
}
