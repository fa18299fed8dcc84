//! Validated runtime configuration for plan generation and the
//! reconciliation cycle.
//!
//! Everything here is checked once at startup; the cycle itself never sees
//! an invalid installment count or period.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lifecycle::PromotionRule;

/// Errors raised while building a [`RepaymentConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("installment count must be a positive integer, got {0}")]
    InvalidInstallments(i64),

    #[error("installment count {count} exceeds the maximum of {max} weekly debits")]
    TooManyInstallments { count: i64, max: u32 },

    #[error("installment count must be an integer, got {0:?}")]
    UnparsableInstallments(String),

    #[error("cycle period must be greater than zero")]
    ZeroCyclePeriod,

    #[error("unknown promotion rule {0:?} (expected due or observed)")]
    InvalidPromotionRule(String),
}

/// Number of weekly debits in a repayment plan. Always at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct InstallmentCount(NonZeroU32);

impl InstallmentCount {
    /// Ten years of weekly debits.
    pub const MAX: u32 = 520;

    pub fn new(count: i64) -> Result<Self, ConfigError> {
        if count > i64::from(Self::MAX) {
            return Err(ConfigError::TooManyInstallments {
                count,
                max: Self::MAX,
            });
        }
        u32::try_from(count)
            .ok()
            .and_then(NonZeroU32::new)
            .map(Self)
            .ok_or(ConfigError::InvalidInstallments(count))
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl TryFrom<i64> for InstallmentCount {
    type Error = ConfigError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<InstallmentCount> for u32 {
    fn from(value: InstallmentCount) -> Self {
        value.get()
    }
}

impl fmt::Display for InstallmentCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InstallmentCount {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let n: i64 = trimmed
            .parse()
            .map_err(|_| ConfigError::UnparsableInstallments(trimmed.to_owned()))?;
        Self::new(n)
    }
}

/// Settings shared by the plan generator and the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepaymentConfig {
    pub installments: InstallmentCount,
    /// Time between the starts of two reconciliation cycles.
    pub cycle_period: Duration,
    pub promotion_rule: PromotionRule,
}

impl RepaymentConfig {
    pub const DEFAULT_INSTALLMENTS: i64 = 4;
    pub const DEFAULT_CYCLE_PERIOD_MS: u64 = 60_000;

    pub fn new(
        installments: i64,
        cycle_period_ms: u64,
        promotion_rule: PromotionRule,
    ) -> Result<Self, ConfigError> {
        if cycle_period_ms == 0 {
            return Err(ConfigError::ZeroCyclePeriod);
        }
        Ok(Self {
            installments: InstallmentCount::new(installments)?,
            cycle_period: Duration::from_millis(cycle_period_ms),
            promotion_rule,
        })
    }
}

impl Default for RepaymentConfig {
    fn default() -> Self {
        Self {
            installments: InstallmentCount(NonZeroU32::MIN.saturating_add(3)),
            cycle_period: Duration::from_millis(Self::DEFAULT_CYCLE_PERIOD_MS),
            promotion_rule: PromotionRule::default(),
        }
    }
}
