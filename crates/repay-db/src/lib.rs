//! Persistence layer for repay: connection pool, embedded migrations, row
//! models and queries over the `transactions` table.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
