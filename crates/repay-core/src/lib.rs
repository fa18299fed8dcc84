//! Repayment planning and debit reconciliation for funded cash advances.
//!
//! - [`plan`] turns an advance into `N` weekly debits.
//! - [`lifecycle`] runs one reconciliation pass over every funded advance.
//! - [`scheduler`] wraps a pass in a locked transaction and fires it on a
//!   fixed period.
//! - [`store`] is the persistence boundary the first two depend on.

pub mod config;
pub mod lifecycle;
pub mod plan;
pub mod scheduler;
pub mod state;
pub mod store;

pub use config::{ConfigError, InstallmentCount, RepaymentConfig};
pub use lifecycle::{CycleReport, DebitLifecycleManager, PromotionRule};
pub use plan::PlanGenerator;
pub use scheduler::{ReconciliationScheduler, run_cycle};
