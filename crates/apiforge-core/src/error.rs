//! Error taxonomy for apiforge-core.
//!
//! Timeouts and partial batch failures are *not* errors here: they are
//! reported as structured [`InvocationResult`](crate::dispatch::InvocationResult)
//! values so callers can tell "try again" apart from hard failures.

use std::future::Future;
use std::time::Duration;

use apiforge_store::{StoreError, StoreResult};

/// Errors produced by dispatch, signing, configuration and persistence.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("function not found: {0}")]
    FunctionNotFound(String),

    #[error("request signature rejected: {0}")]
    Signature(String),

    #[error("credentials unavailable: {0}")]
    Credentials(String),

    #[error("upstream returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl From<reqwest::Error> for ForgeError {
    fn from(err: reqwest::Error) -> Self {
        ForgeError::Transport(err.to_string())
    }
}

/// Result type for apiforge-core operations.
pub type ForgeResult<T> = std::result::Result<T, ForgeError>;

/// Run a blob store operation under `timeout`.
pub async fn store_timeout<T, F>(timeout: Duration, operation: F) -> ForgeResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ForgeError::Store(StoreError::Backend(format!(
            "store operation timed out after {}ms",
            timeout.as_millis()
        )))),
    }
}
