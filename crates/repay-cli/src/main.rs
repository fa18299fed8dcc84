mod advance_cmds;
mod config;
mod debit_cmds;
mod preview_cmd;
mod run_cmd;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use repay_core::lifecycle::PromotionRule;
use repay_core::plan::PlanGenerator;
use repay_db::models::{TransactionDirection, TransactionStatus};
use repay_db::queries::transactions as db;
use repay_db::pool;

use config::{CliOverrides, RepayConfig};

#[derive(Parser)]
#[command(name = "repay", about = "Weekly repayment plans and debit reconciliation for cash advances")]
struct Cli {
    /// Database URL (overrides REPAY_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a repay config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/repay")]
        db_url: String,
        /// Number of weekly debits per plan
        #[arg(long)]
        installments: Option<i64>,
        /// Milliseconds between reconciliation cycles
        #[arg(long)]
        period_ms: Option<u64>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the repay database (requires config file or env vars)
    DbInit,
    /// Run reconciliation cycles on a fixed period until Ctrl+C
    Run {
        #[command(flatten)]
        repayment: RepaymentArgs,
    },
    /// Run a single reconciliation cycle and print what changed
    Cycle {
        #[command(flatten)]
        repayment: RepaymentArgs,
        /// Print the cycle report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Funded advance management
    Advance {
        #[command(subcommand)]
        command: AdvanceCommands,
    },
    /// List an account's debits in time order
    Debits {
        /// Destination bank account
        account: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record the payment outcome of a debit waiting to be sent
    Settle {
        /// Debit ID
        debit_id: String,
        #[arg(long, value_enum)]
        outcome: Outcome,
    },
    /// Show the plan an advance would get (no database required)
    Preview {
        /// Advance amount in minor units
        amount: i64,
        /// Number of weekly debits (defaults to the configured value)
        #[arg(long)]
        installments: Option<i64>,
        /// Funding time, RFC 3339 (defaults to now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum AdvanceCommands {
    /// Record a funded advance (the next cycle creates its plan)
    Record {
        /// Destination bank account
        account: String,
        /// Amount in minor units
        amount: i64,
        /// Funding time, RFC 3339 (defaults to now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// List funded advances
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Overrides for the repayment settings of `run` and `cycle`.
#[derive(Args, Debug, Default)]
pub struct RepaymentArgs {
    /// Number of weekly debits per plan
    #[arg(long)]
    installments: Option<i64>,
    /// Milliseconds between reconciliation cycles
    #[arg(long)]
    period_ms: Option<u64>,
    /// Which debits a cycle releases for sending
    #[arg(long, value_enum)]
    promotion_rule: Option<PromotionRuleArg>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum PromotionRuleArg {
    /// On-hold debits whose time has come
    Due,
    /// Any debit whose time is still in the future
    Observed,
}

impl From<PromotionRuleArg> for PromotionRule {
    fn from(arg: PromotionRuleArg) -> Self {
        match arg {
            PromotionRuleArg::Due => PromotionRule::Due,
            PromotionRuleArg::Observed => PromotionRule::Observed,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Outcome {
    Success,
    Failure,
}

impl From<Outcome> for TransactionStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => TransactionStatus::Success,
            Outcome::Failure => TransactionStatus::Failure,
        }
    }
}

fn overrides(database_url: Option<String>, args: RepaymentArgs) -> CliOverrides {
    CliOverrides {
        database_url,
        installments: args.installments,
        cycle_period_ms: args.period_ms,
        promotion_rule: args.promotion_rule.map(Into::into),
    }
}

/// Execute the `repay init` command: write config file.
fn cmd_init(
    db_url: &str,
    installments: Option<i64>,
    period_ms: Option<u64>,
    force: bool,
) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        repayment: config::RepaymentSection {
            installments,
            cycle_period_ms: period_ms,
            promotion_rule: None,
        },
    };

    // Refuse to write a file that would fail at startup.
    RepayConfig::resolve_with(&CliOverrides::default(), |_| None, Some(&cfg))?;

    let path = config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    if let Some(n) = installments {
        println!("  repayment.installments = {n}");
    }
    if let Some(ms) = period_ms {
        println!("  repayment.cycle_period_ms = {ms}");
    }
    println!();
    println!("Next: run `repay db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `repay db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<String>) -> anyhow::Result<()> {
    let resolved = RepayConfig::resolve(&overrides(cli_db_url, RepaymentArgs::default()))?;

    println!("Initializing repay database...");

    let provisioned = pool::provision(&resolved.db_config).await?;
    let db_pool = provisioned.pool;

    let advances = db::find_by_status_and_direction(
        &db_pool,
        TransactionStatus::Success,
        TransactionDirection::Credit,
    )
    .await?;
    let debits = db::debit_status_counts(&db_pool).await?;
    db_pool.close().await;

    if provisioned.created {
        println!("Database created and migrated.");
    } else {
        println!("Database already existed; migrations are up to date.");
    }
    println!("  funded advances: {}", advances.len());
    for (status, count) in &debits {
        println!("  {status:<18} debits: {count}");
    }

    println!("repay db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so `--json` output on stdout stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            db_url,
            installments,
            period_ms,
            force,
        } => {
            cmd_init(&db_url, installments, period_ms, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url).await?;
        }
        Commands::Run { repayment } => {
            let resolved = RepayConfig::resolve(&overrides(cli.database_url, repayment))?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = run_cmd::run_daemon(&db_pool, &resolved.repayment).await;
            db_pool.close().await;
            result?;
        }
        Commands::Cycle { repayment, json } => {
            let resolved = RepayConfig::resolve(&overrides(cli.database_url, repayment))?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = run_cmd::run_once(&db_pool, &resolved.repayment, json).await;
            db_pool.close().await;
            result?;
        }
        Commands::Advance { command } => {
            let resolved = RepayConfig::resolve(&overrides(cli.database_url, RepaymentArgs::default()))?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = advance_cmds::run_advance_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Debits { account, json } => {
            let resolved = RepayConfig::resolve(&overrides(cli.database_url, RepaymentArgs::default()))?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = debit_cmds::run_debits(&db_pool, &account, json).await;
            db_pool.close().await;
            result?;
        }
        Commands::Settle { debit_id, outcome } => {
            let resolved = RepayConfig::resolve(&overrides(cli.database_url, RepaymentArgs::default()))?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = debit_cmds::run_settle(&db_pool, &debit_id, outcome).await;
            db_pool.close().await;
            result?;
        }
        Commands::Preview {
            amount,
            installments,
            at,
            json,
        } => {
            let args = RepaymentArgs {
                installments,
                ..Default::default()
            };
            let resolved = RepayConfig::resolve(&overrides(cli.database_url, args))
                .context("failed to resolve repayment settings")?;
            let planner = PlanGenerator::new(resolved.repayment.installments);
            preview_cmd::run_preview(&planner, amount, at.unwrap_or_else(Utc::now), json).await?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "repay", &mut std::io::stdout());
        }
    }

    Ok(())
}
