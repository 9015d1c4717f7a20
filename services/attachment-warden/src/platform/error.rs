use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("platform call timed out after {0:?}")]
    Timeout(Duration),
    #[error("platform request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("platform responded with {status}: {body}")]
    Rejected { status: u16, body: String },
}
