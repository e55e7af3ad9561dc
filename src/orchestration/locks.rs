//! Per-user mutual exclusion.

use crate::domain::UserId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lazily created async mutex per user.
///
/// Operations on the same user run one at a time; different users never
/// contend on each other's lock.
#[derive(Debug, Default, Clone)]
pub struct UserLocks {
    locks: Arc<DashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the user's lock. Released when the guard drops.
    pub async fn acquire(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        // Clone the Arc out before awaiting so no shard lock is held across
        // the await.
        let lock = self
            .locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Number of users that have ever been locked.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
