use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("connection poisoned")]
    Poisoned,
    #[error("io error: {0}")]
    IoError(#[from] io::Error),
}

impl StorageError {
    /// Maps SQLite unique-constraint violations onto [`StorageError::Conflict`].
    pub(crate) fn from_write(err: rusqlite::Error, what: impl Into<String>) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StorageError::Conflict(what.into())
            }
            other => StorageError::DatabaseError(other),
        }
    }
}
