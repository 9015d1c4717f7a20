//! Storage seams used by the admission engine and the reset scheduler.
//!
//! Both traits are synchronous; callers run them on the blocking pool.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::storage::StorageError;

use super::error::QuotaError;
use super::model::{ChannelId, ChannelRule, GlobalDefault, ResetFrequency, UsageRecord, UserId};

pub trait UsageStore: Send + Sync + 'static {
    fn get_usage(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
    ) -> Result<Option<UsageRecord>, StorageError>;

    /// Atomic upsert of a single (user, channel) record.
    fn commit_usage(&self, record: &UsageRecord) -> Result<(), StorageError>;

    fn list_usage(&self) -> Result<Vec<UsageRecord>, StorageError>;
}

pub trait PolicySource: Send + Sync + 'static {
    /// Rules for one channel sorted by `(order_index, id)`.
    fn channel_rules(&self, channel_id: ChannelId) -> Result<Vec<ChannelRule>, StorageError>;

    fn global_default(&self) -> Result<Option<GlobalDefault>, StorageError>;

    /// Current reset cadence of every rule, keyed by rule id.
    fn rule_cadences(&self) -> Result<HashMap<i64, ResetFrequency>, StorageError>;

    fn is_channel_blocked(&self, channel_id: ChannelId) -> Result<bool, StorageError>;
}

/// Runs a store call on the blocking pool, bounded by `timeout`.
///
/// A timed-out call keeps running to completion on the pool; only the caller
/// stops waiting for it.
pub(crate) async fn run_blocking<T, F>(
    timeout: Duration,
    operation: &'static str,
    call: F,
) -> Result<T, QuotaError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    let task = tokio::task::spawn_blocking(call);
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(source))) => Err(QuotaError::StoreUnavailable { operation, source }),
        Ok(Err(join_err)) => Err(QuotaError::TaskFailed(join_err.to_string())),
        Err(_) => Err(QuotaError::StoreTimeout { operation, timeout }),
    }
}

/// Runs a store write on the blocking pool.
///
/// The write is skipped when it has not started by `timeout`. A write that did
/// start is always awaited, so the caller keeps any key lock it holds until the
/// row is settled and reports exactly what was persisted.
pub(crate) async fn run_write<T, F>(
    timeout: Duration,
    operation: &'static str,
    call: F,
) -> Result<T, QuotaError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    let deadline = Instant::now() + timeout;
    let mut task = tokio::task::spawn_blocking(move || {
        if Instant::now() >= deadline {
            return None;
        }
        Some(call())
    });

    let settled = match tokio::time::timeout(timeout, &mut task).await {
        Ok(joined) => joined,
        Err(_) => {
            warn!(operation, ?timeout, "store write overran its deadline; waiting for it to settle");
            task.await
        }
    };

    match settled {
        Ok(Some(Ok(value))) => Ok(value),
        Ok(Some(Err(source))) => Err(QuotaError::StoreUnavailable { operation, source }),
        Ok(None) => Err(QuotaError::StoreTimeout { operation, timeout }),
        Err(join_err) => Err(QuotaError::TaskFailed(join_err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn write_past_deadline_is_never_started() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let result = run_write(Duration::ZERO, "commit_usage", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(QuotaError::StoreTimeout { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn started_write_is_awaited_past_timeout() {
        let result = run_write(Duration::from_millis(20), "commit_usage", || {
            std::thread::sleep(Duration::from_millis(120));
            Ok(7)
        })
        .await;

        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn slow_read_times_out() {
        let result = run_blocking(Duration::from_millis(20), "get_usage", || {
            std::thread::sleep(Duration::from_millis(120));
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(QuotaError::StoreTimeout { .. })));
    }
}
