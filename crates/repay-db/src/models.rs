use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Direction of money movement relative to the borrower's account.
///
/// Advances are credits into the account; repayment installments are
/// debits out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionDirection {
    Credit,
    Debit,
}

impl fmt::Display for TransactionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        };
        f.pad(s)
    }
}

impl FromStr for TransactionDirection {
    type Err = TransactionDirectionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(Self::Credit),
            "debit" => Ok(Self::Debit),
            other => Err(TransactionDirectionParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`TransactionDirection`] string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid transaction direction: {0:?}")]
pub struct TransactionDirectionParseError(pub String);

// ---------------------------------------------------------------------------

/// Status of a transaction row.
///
/// Debits move `on_hold -> waiting_to_be_sent` inside the reconciliation
/// cycle. `success` and `failure` are written by the downstream performer
/// that actually moves the money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    OnHold,
    WaitingToBeSent,
    Success,
    Failure,
}

impl TransactionStatus {
    /// Whether the performer has already recorded an outcome.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::OnHold => "on_hold",
            Self::WaitingToBeSent => "waiting_to_be_sent",
            Self::Success => "success",
            Self::Failure => "failure",
        };
        f.pad(s)
    }
}

impl FromStr for TransactionStatus {
    type Err = TransactionStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on_hold" => Ok(Self::OnHold),
            "waiting_to_be_sent" => Ok(Self::WaitingToBeSent),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            other => Err(TransactionStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`TransactionStatus`] string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid transaction status: {0:?}")]
pub struct TransactionStatusParseError(pub String);

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A row of the `transactions` table.
///
/// Advances (`direction = credit`) and repayment installments
/// (`direction = debit`) share this shape. They are correlated only by
/// `dst_bank_account`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct BillingTransaction {
    pub id: Uuid,
    pub dst_bank_account: String,
    /// Amount in minor currency units.
    pub amount: i64,
    pub transaction_time: DateTime<Utc>,
    pub direction: TransactionDirection,
    pub status: TransactionStatus,
}

/// A funded advance: a `credit` row with status `success`.
pub type Advance = BillingTransaction;

/// A repayment installment: a `debit` row.
pub type Debit = BillingTransaction;

impl BillingTransaction {
    /// Build a new debit row with a fresh id. Nothing is persisted.
    pub fn new_debit(
        dst_bank_account: impl Into<String>,
        amount: i64,
        transaction_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            dst_bank_account: dst_bank_account.into(),
            amount,
            transaction_time,
            direction: TransactionDirection::Debit,
            status: TransactionStatus::OnHold,
        }
    }

    /// Build a funded advance row with a fresh id. Nothing is persisted.
    pub fn new_advance(
        dst_bank_account: impl Into<String>,
        amount: i64,
        transaction_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            dst_bank_account: dst_bank_account.into(),
            amount,
            transaction_time,
            direction: TransactionDirection::Credit,
            status: TransactionStatus::Success,
        }
    }

    pub fn is_funded_advance(&self) -> bool {
        self.direction == TransactionDirection::Credit && self.status == TransactionStatus::Success
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
