//! Services module for cashbook-service.

pub mod budget;
pub mod cascade;
pub mod database;
pub mod metrics;
pub mod user_locks;

pub use database::Database;
pub use metrics::{get_metrics, init_metrics};
pub use user_locks::UserLocks;
