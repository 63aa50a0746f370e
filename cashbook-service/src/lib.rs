//! Cashbook Service - Per-user cash/bank ledger with cascading monthly balances.

pub mod config;
pub mod models;
pub mod services;
