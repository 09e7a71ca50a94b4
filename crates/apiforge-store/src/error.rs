//! Error types for apiforge-store

use thiserror::Error;

/// Errors that can occur in the blob storage layer
#[derive(Error, Debug)]
pub enum StoreError {
    /// No object stored under the key
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// Key or key segment rejected by the layout rules
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored object could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Remote backend failure (network, auth, unexpected status)
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether this error means the key simply is not there.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
