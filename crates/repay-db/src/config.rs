use std::env;
use std::time::Duration;

/// Connection settings for the transaction store.
///
/// `REPAY_DATABASE_URL` selects the server and database; when unset the
/// local default `postgresql://localhost:5432/repay` is used.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Full PostgreSQL connection URL.
    pub database_url: String,
    /// Upper bound on pooled connections. The reconciliation cycle holds one
    /// connection for its whole transaction.
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DbConfig {
    pub const DEFAULT_URL: &str = "postgresql://localhost:5432/repay";
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

    /// Build a config from `REPAY_DATABASE_URL`, falling back to
    /// [`Self::DEFAULT_URL`].
    pub fn from_env() -> Self {
        let database_url =
            env::var("REPAY_DATABASE_URL").unwrap_or_else(|_| Self::DEFAULT_URL.to_owned());
        Self::new(database_url)
    }

    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(10),
        }
    }

    /// Database name: the last path segment of the URL.
    pub fn database_name(&self) -> Option<&str> {
        self.database_url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
    }

    /// URL of the `postgres` maintenance database on the same server, used
    /// to issue `CREATE DATABASE`.
    pub fn maintenance_url(&self) -> String {
        match self.database_url.rfind('/') {
            Some(pos) => format!("{}/postgres", &self.database_url[..pos]),
            None => self.database_url.clone(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_url_points_at_local_repay_db() {
        let cfg = DbConfig::new(DbConfig::DEFAULT_URL);
        assert_eq!(cfg.database_name(), Some("repay"));
        assert_eq!(cfg.max_connections, DbConfig::DEFAULT_MAX_CONNECTIONS);
    }

    #[test]
    fn database_name_extraction() {
        let cfg = DbConfig::new("postgresql://db.internal:5433/ledger");
        assert_eq!(cfg.database_name(), Some("ledger"));
    }

    #[test]
    fn database_name_missing() {
        let cfg = DbConfig::new("postgresql://localhost:5432/");
        assert_eq!(cfg.database_name(), None);
    }

    #[test]
    fn maintenance_url_replaces_db() {
        let cfg = DbConfig::new("postgresql://user:pw@localhost:5432/repay");
        assert_eq!(
            cfg.maintenance_url(),
            "postgresql://user:pw@localhost:5432/postgres"
        );
    }
}
