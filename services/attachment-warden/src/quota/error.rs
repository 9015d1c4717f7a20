use std::time::Duration;

use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("usage store unavailable during {operation}: {source}")]
    StoreUnavailable {
        operation: &'static str,
        #[source]
        source: StorageError,
    },
    #[error("usage store timed out after {timeout:?} during {operation}")]
    StoreTimeout {
        operation: &'static str,
        timeout: Duration,
    },
    #[error("blocking store task failed: {0}")]
    TaskFailed(String),
}
