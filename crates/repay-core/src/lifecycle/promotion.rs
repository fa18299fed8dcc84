use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use repay_db::models::{Debit, TransactionStatus};

use crate::config::ConfigError;

/// Which debits a reconciliation cycle releases to WAITING_TO_BE_SENT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionRule {
    /// ON_HOLD debits whose time is at or before now.
    #[default]
    Due,
    /// Debits of any status whose time is strictly after now. Reproduces the
    /// selection of the legacy billing service, for side-by-side audits.
    Observed,
}

impl PromotionRule {
    pub fn selects(self, debit: &Debit, now: DateTime<Utc>) -> bool {
        match self {
            Self::Due => debit.status == TransactionStatus::OnHold && debit.transaction_time <= now,
            Self::Observed => debit.transaction_time > now,
        }
    }
}

impl fmt::Display for PromotionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Due => "due",
            Self::Observed => "observed",
        })
    }
}

impl FromStr for PromotionRule {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "due" => Ok(Self::Due),
            "observed" => Ok(Self::Observed),
            other => Err(ConfigError::InvalidPromotionRule(other.to_owned())),
        }
    }
}
