use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::model::UsageKey;

/// Per-(user, channel) mutual exclusion for read-modify-write sequences.
#[derive(Clone, Default)]
pub struct KeyLocks {
    inner: Arc<DashMap<UsageKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: UsageKey) -> OwnedMutexGuard<()> {
        // Clone the mutex out so the shard lock is released before awaiting.
        let mutex = Arc::clone(&self.inner.entry(key).or_default());
        mutex.lock_owned().await
    }

    /// Removes entries that no task currently holds or waits on.
    pub fn prune(&self) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        before - self.inner.len()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
