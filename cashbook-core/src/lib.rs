//! cashbook-core: Shared infrastructure for the cashbook engine.
pub mod error;
pub mod observability;

pub use serde;
pub use serde_json;
pub use tracing;
