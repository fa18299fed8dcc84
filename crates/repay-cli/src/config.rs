//! Configuration file management for repay.
//!
//! Provides a TOML-based config file at `~/.config/repay/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use repay_core::config::RepaymentConfig;
use repay_core::lifecycle::PromotionRule;
use repay_db::config::DbConfig;

pub const ENV_DATABASE_URL: &str = "REPAY_DATABASE_URL";
pub const ENV_INSTALLMENTS: &str = "REPAY_INSTALLMENTS";
pub const ENV_CYCLE_PERIOD_MS: &str = "REPAY_CYCLE_PERIOD_MS";
pub const ENV_PROMOTION_RULE: &str = "REPAY_PROMOTION_RULE";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub repayment: RepaymentSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

/// Every key is optional; missing keys fall through to the defaults.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RepaymentSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installments: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_period_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion_rule: Option<PromotionRule>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the repay config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/repay` or `~/.config/repay`,
/// also on macOS.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("repay");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("repay")
}

/// Return the path to the repay config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns `Ok(None)` if it does not exist.
pub fn load_config() -> Result<Option<ConfigFile>> {
    let path = config_path();
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    // The database URL may carry a password.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(path)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Values given on the command line. `None` means "not given".
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub database_url: Option<String>,
    pub installments: Option<i64>,
    pub cycle_period_ms: Option<u64>,
    pub promotion_rule: Option<PromotionRule>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct RepayConfig {
    pub db_config: DbConfig,
    pub repayment: RepaymentConfig,
}

impl RepayConfig {
    /// Resolve configuration from the process environment and the config
    /// file on disk.
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let file = load_config()?;
        Self::resolve_with(cli, |key| std::env::var(key).ok(), file.as_ref())
    }

    /// Resolve using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `--database-url` > `REPAY_DATABASE_URL` > `database.url` > `DbConfig::DEFAULT_URL`
    /// - Installments: `--installments` > `REPAY_INSTALLMENTS` > `repayment.installments` > 4
    /// - Period: `--period-ms` > `REPAY_CYCLE_PERIOD_MS` > `repayment.cycle_period_ms` > 60000
    /// - Promotion: `--promotion-rule` > `REPAY_PROMOTION_RULE` > `repayment.promotion_rule` > `due`
    ///
    /// The result is validated; an invalid value from any layer is an error,
    /// not a fallthrough.
    pub fn resolve_with<F>(cli: &CliOverrides, env: F, file: Option<&ConfigFile>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_url = match (&cli.database_url, env(ENV_DATABASE_URL)) {
            (Some(url), _) => url.clone(),
            (None, Some(url)) => url,
            (None, None) => file
                .map(|f| f.database.url.clone())
                .unwrap_or_else(|| DbConfig::DEFAULT_URL.to_string()),
        };

        let section = file.map(|f| &f.repayment);

        let installments = match cli.installments {
            Some(n) => n,
            None => match env(ENV_INSTALLMENTS) {
                Some(raw) => raw
                    .parse()
                    .with_context(|| format!("{ENV_INSTALLMENTS} is not an integer: {raw:?}"))?,
                None => section
                    .and_then(|s| s.installments)
                    .unwrap_or(RepaymentConfig::DEFAULT_INSTALLMENTS),
            },
        };

        let cycle_period_ms = match cli.cycle_period_ms {
            Some(ms) => ms,
            None => match env(ENV_CYCLE_PERIOD_MS) {
                Some(raw) => raw.parse().with_context(|| {
                    format!("{ENV_CYCLE_PERIOD_MS} is not a non-negative integer: {raw:?}")
                })?,
                None => section
                    .and_then(|s| s.cycle_period_ms)
                    .unwrap_or(RepaymentConfig::DEFAULT_CYCLE_PERIOD_MS),
            },
        };

        let promotion_rule = match cli.promotion_rule {
            Some(rule) => rule,
            None => match env(ENV_PROMOTION_RULE) {
                Some(raw) => raw
                    .parse()
                    .with_context(|| format!("invalid {ENV_PROMOTION_RULE}"))?,
                None => section.and_then(|s| s.promotion_rule).unwrap_or_default(),
            },
        };

        let repayment = RepaymentConfig::new(installments, cycle_period_ms, promotion_rule)
            .context("invalid repayment configuration")?;

        Ok(Self {
            db_config: DbConfig::new(db_url),
            repayment,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
