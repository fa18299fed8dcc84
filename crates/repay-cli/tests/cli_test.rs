//! End-to-end tests for the `repay` binary.
//!
//! Commands that need a database run against a temporary database on the
//! shared test PostgreSQL (see `repay-test-utils`). Every invocation gets an
//! empty `XDG_CONFIG_HOME` so a developer's own config file is never read.

use std::process::Output;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tempfile::TempDir;
use tokio::process::Command;

use repay_db::models::{TransactionDirection, TransactionStatus};
use repay_db::queries::transactions as db;
use repay_test_utils::{create_test_db, drop_test_db, pg_url, test_db_url};

async fn repay(config_home: &TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_repay"))
        .args(args)
        .env("XDG_CONFIG_HOME", config_home.path())
        .env("RUST_LOG", "warn")
        .env_remove("REPAY_DATABASE_URL")
        .env_remove("REPAY_INSTALLMENTS")
        .env_remove("REPAY_CYCLE_PERIOD_MS")
        .env_remove("REPAY_PROMOTION_RULE")
        .output()
        .await
        .expect("failed to spawn repay")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "repay failed: {}\nstderr: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
}

#[tokio::test]
async fn preview_prints_weekly_plan_as_json() {
    let home = TempDir::new().unwrap();
    let out = repay(
        &home,
        &[
            "preview",
            "300",
            "--installments",
            "3",
            "--at",
            "2024-01-01T00:00:00Z",
            "--json",
        ],
    )
    .await;
    assert_success(&out);

    let plan: Vec<Value> = serde_json::from_str(&stdout(&out)).expect("valid JSON");
    assert_eq!(plan.len(), 3);

    let t0: DateTime<Utc> = "2024-01-01T00:00:00Z".parse().unwrap();
    for (week, debit) in (1..).zip(&plan) {
        assert_eq!(debit["amount"], 100);
        assert_eq!(debit["status"], "on_hold");
        assert_eq!(debit["direction"], "debit");
        let at: DateTime<Utc> = debit["transaction_time"].as_str().unwrap().parse().unwrap();
        assert_eq!(at, t0 + Duration::weeks(week));
    }
}

#[tokio::test]
async fn preview_rejects_zero_installments() {
    let home = TempDir::new().unwrap();
    let out = repay(&home, &["preview", "300", "--installments", "0"]).await;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("installment"));
}

#[tokio::test]
async fn init_writes_config_and_refuses_to_overwrite() {
    let home = TempDir::new().unwrap();

    let out = repay(
        &home,
        &["init", "--db-url", "postgresql://h:5432/d", "--installments", "6"],
    )
    .await;
    assert_success(&out);

    let written = std::fs::read_to_string(home.path().join("repay/config.toml")).unwrap();
    assert!(written.contains("postgresql://h:5432/d"));
    assert!(written.contains("installments = 6"));

    let again = repay(&home, &["init"]).await;
    assert!(!again.status.success());
    assert!(String::from_utf8_lossy(&again.stderr).contains("already exists"));

    let forced = repay(&home, &["init", "--force"]).await;
    assert_success(&forced);
}

#[tokio::test]
async fn init_rejects_invalid_installments() {
    let home = TempDir::new().unwrap();
    let out = repay(&home, &["init", "--installments", "-2"]).await;
    assert!(!out.status.success());
    assert!(!home.path().join("repay/config.toml").exists());
}

#[tokio::test]
async fn record_cycle_settle_flow() {
    let (pool, db_name) = create_test_db().await;
    let url = test_db_url(&db_name).await;
    let home = TempDir::new().unwrap();

    // Funded 8 days ago with 3 installments: only week 1 is due.
    let funded = (Utc::now() - Duration::days(8)).to_rfc3339();
    let out = repay(
        &home,
        &["--database-url", &url, "advance", "record", "ACC-9", "300", "--at", &funded],
    )
    .await;
    assert_success(&out);

    let out = repay(
        &home,
        &["--database-url", &url, "cycle", "--installments", "3", "--json"],
    )
    .await;
    assert_success(&out);
    let report: Value = serde_json::from_str(&stdout(&out)).expect("valid JSON");
    assert_eq!(report["plans_created"], 1);
    assert_eq!(report["debits_created"], 3);
    assert_eq!(report["debits_promoted"], 1);

    let mut conn = pool.acquire().await.unwrap();
    let debits = db::find_debits_by_account_ordered_by_time(&mut *conn, "ACC-9")
        .await
        .unwrap();
    drop(conn);
    assert_eq!(debits.len(), 3);
    assert_eq!(debits[0].status, TransactionStatus::WaitingToBeSent);
    assert!(debits.iter().all(|d| d.direction == TransactionDirection::Debit));

    let first = debits[0].id.to_string();
    let out = repay(
        &home,
        &["--database-url", &url, "settle", &first, "--outcome", "failure"],
    )
    .await;
    assert_success(&out);

    // Settling twice is rejected by the status check.
    let out = repay(
        &home,
        &["--database-url", &url, "settle", &first, "--outcome", "success"],
    )
    .await;
    assert!(!out.status.success());

    let out = repay(
        &home,
        &["--database-url", &url, "cycle", "--installments", "3", "--json"],
    )
    .await;
    assert_success(&out);
    let report: Value = serde_json::from_str(&stdout(&out)).expect("valid JSON");
    assert_eq!(report["plans_created"], 0);
    assert_eq!(report["debits_rescheduled"], 1);

    let out = repay(&home, &["--database-url", &url, "debits", "ACC-9", "--json"]).await;
    assert_success(&out);
    let listed: Vec<Value> = serde_json::from_str(&stdout(&out)).expect("valid JSON");
    let failed = listed
        .iter()
        .find(|d| d["id"] == first.as_str())
        .expect("failed debit listed");
    assert_eq!(failed["status"], "failure");
    let failed_at: DateTime<Utc> = failed["transaction_time"].as_str().unwrap().parse().unwrap();
    assert_eq!(failed_at, debits[1].transaction_time);

    drop(pool);
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn advance_list_shows_funded_advances() {
    let (pool, db_name) = create_test_db().await;
    let url = test_db_url(&db_name).await;
    let home = TempDir::new().unwrap();

    db::insert_advance(&pool, "ACC-1", 500, Utc::now())
        .await
        .unwrap();

    let out = repay(&home, &["--database-url", &url, "advance", "list"]).await;
    assert_success(&out);
    let text = stdout(&out);
    assert!(text.contains("ACC-1"), "{text}");
    assert!(text.contains("500"), "{text}");

    drop(pool);
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn preview_rejects_installment_count_above_cap() {
    let home = TempDir::new().unwrap();
    let out = repay(&home, &["preview", "300", "--installments", "14000000"]).await;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("exceeds the maximum"));
}

#[tokio::test]
async fn db_init_creates_then_reuses_database() {
    let db_name = format!("repay_cli_init_{}", uuid::Uuid::new_v4().simple());
    let url = format!("{}/{db_name}", pg_url().await);
    let home = TempDir::new().unwrap();

    let out = repay(&home, &["--database-url", &url, "db-init"]).await;
    assert_success(&out);
    assert!(stdout(&out).contains("Database created"), "{}", stdout(&out));

    let out = repay(&home, &["--database-url", &url, "db-init"]).await;
    assert_success(&out);
    assert!(stdout(&out).contains("already existed"), "{}", stdout(&out));

    drop_test_db(&db_name).await;
}
