//! Per-user write serialization.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Registry of per-user async locks.
///
/// Every mutating operation holds its user's lock for the whole
/// mutation-plus-cascade transaction, so there is a single writer per user
/// at any time. Readers never take a lock.
#[derive(Clone, Default)]
pub struct UserLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Get the lock handle for a user, creating it on first use.
    pub fn for_user(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
