//! Connection pool, embedded migrations and first-run provisioning.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tracing::info;

use crate::config::DbConfig;

/// Migrations embedded at compile time from `crates/repay-db/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Open a connection pool sized by `config`.
pub async fn create_pool(config: &DbConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.database_url)
        .await
        .with_context(|| format!("failed to connect to database at {}", config.database_url))
}

/// Apply all pending embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("failed to run database migrations")?;
    info!(migrations = MIGRATOR.iter().count(), "schema up to date");
    Ok(())
}

/// Outcome of [`provision`].
pub struct Provisioned {
    pub pool: PgPool,
    /// The database did not exist and was created.
    pub created: bool,
}

/// Make the configured database usable: create it if missing, connect,
/// migrate.
pub async fn provision(config: &DbConfig) -> Result<Provisioned> {
    let created = ensure_database_exists(config).await?;
    let pool = create_pool(config).await?;
    run_migrations(&pool).await?;
    Ok(Provisioned { pool, created })
}

/// Create the configured database through the server's `postgres`
/// database. Returns `true` if it was created, `false` if it already existed.
pub async fn ensure_database_exists(config: &DbConfig) -> Result<bool> {
    let name = config
        .database_name()
        .context("database URL has no database name")?;

    let maintenance = DbConfig {
        database_url: config.maintenance_url(),
        max_connections: 1,
        ..config.clone()
    };
    let admin = create_pool(&maintenance).await?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(name)
            .fetch_one(&admin)
            .await
            .context("failed to look up database")?;

    if !exists {
        admin
            .execute(format!("CREATE DATABASE {}", quote_ident(name)).as_str())
            .await
            .with_context(|| format!("failed to create database {name}"))?;
        info!(db = name, "database created");
    }

    admin.close().await;
    Ok(!exists)
}

/// Double-quote an identifier for statements that take no bind parameters.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("repay"), "\"repay\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }
}
