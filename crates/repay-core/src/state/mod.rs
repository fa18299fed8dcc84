//! Debit state transitions.
//!
//! The reconciliation cycle owns `on_hold -> waiting_to_be_sent`. The
//! payment performer owns the outcome edges. This module validates the
//! graph and applies performer outcomes with an optimistic status check.

use anyhow::{Context, Result, bail};
use sqlx::PgPool;
use uuid::Uuid;

use repay_db::models::{TransactionDirection, TransactionStatus};
use repay_db::queries::transactions as db;

/// The debit state machine.
///
/// ```text
/// on_hold            -> waiting_to_be_sent   (reconciliation: due)
/// waiting_to_be_sent -> success              (performer)
/// waiting_to_be_sent -> failure              (performer)
/// ```
///
/// A failed debit keeps its `failure` status when the cycle moves it to the
/// week before the last payment; that is a time change, not a transition.
pub struct DebitStateMachine;

impl DebitStateMachine {
    pub fn is_valid_transition(from: TransactionStatus, to: TransactionStatus) -> bool {
        matches!(
            (from, to),
            (TransactionStatus::OnHold, TransactionStatus::WaitingToBeSent)
                | (TransactionStatus::WaitingToBeSent, TransactionStatus::Success)
                | (TransactionStatus::WaitingToBeSent, TransactionStatus::Failure)
        )
    }

    /// Record the performer's result for a released debit.
    ///
    /// Fails if the debit does not exist, is not a debit, or is no longer
    /// waiting to be sent.
    pub async fn record_outcome(pool: &PgPool, debit_id: Uuid, outcome: TransactionStatus) -> Result<()> {
        if !Self::is_valid_transition(TransactionStatus::WaitingToBeSent, outcome) {
            bail!("{outcome} is not a valid outcome for a sent debit");
        }

        let rows = db::record_debit_outcome(pool, debit_id, outcome)
            .await
            .with_context(|| format!("failed to record {outcome} for debit {debit_id}"))?;

        if rows == 0 {
            match db::get_transaction(pool, debit_id).await? {
                None => bail!("debit {debit_id} not found"),
                Some(t) if t.direction != TransactionDirection::Debit => {
                    bail!("transaction {debit_id} is a {}, not a debit", t.direction)
                }
                Some(t) => bail!(
                    "debit {debit_id} has status {}, expected {}",
                    t.status,
                    TransactionStatus::WaitingToBeSent
                ),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions_accepted() {
        let valid = [
            (TransactionStatus::OnHold, TransactionStatus::WaitingToBeSent),
            (TransactionStatus::WaitingToBeSent, TransactionStatus::Success),
            (TransactionStatus::WaitingToBeSent, TransactionStatus::Failure),
        ];
        for (from, to) in valid {
            assert!(
                DebitStateMachine::is_valid_transition(from, to),
                "expected {from} -> {to} to be valid"
            );
        }
    }

    #[test]
    fn invalid_transitions_rejected() {
        let invalid = [
            (TransactionStatus::OnHold, TransactionStatus::Success),
            (TransactionStatus::OnHold, TransactionStatus::Failure),
            (TransactionStatus::WaitingToBeSent, TransactionStatus::OnHold),
            (TransactionStatus::Success, TransactionStatus::Failure),
            (TransactionStatus::Failure, TransactionStatus::OnHold),
            (TransactionStatus::Failure, TransactionStatus::WaitingToBeSent),
        ];
        for (from, to) in invalid {
            assert!(
                !DebitStateMachine::is_valid_transition(from, to),
                "expected {from} -> {to} to be invalid"
            );
        }
    }
}
