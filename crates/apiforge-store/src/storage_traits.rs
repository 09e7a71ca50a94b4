//! Storage trait definitions for apiforge
//!
//! `BlobStore` is a flat key/value object store (the S3 model): keys are
//! `/`-separated strings, values are opaque bytes. There are no transactions
//! and no optimistic concurrency: a `put` to an existing key overwrites it
//! (last writer wins).
//!
//! In-memory fakes are provided for testing via the `fakes` module.

use async_trait::async_trait;

use crate::error::StoreError;

/// Result type for storage operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Content type used for JSON documents.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Flat blob store.
///
/// Guarantees:
/// - `get(key)` after `put(key, data)` returns `data` (until the next `put`).
/// - `get` of an absent key returns `StoreError::NotFound`.
/// - `list(prefix)` returns every key starting with `prefix`, sorted.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `key`, replacing any previous object.
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> StoreResult<()>;

    /// Retrieve the object stored under `key`.
    async fn get(&self, key: &str) -> StoreResult<Vec<u8>>;

    /// Check whether an object exists under `key`.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// List keys beginning with `prefix`, in lexicographic order.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

/// Validate a full object key.
///
/// Keys must be relative, non-empty, and free of empty, `.` or `..`
/// segments so that every backend (including the filesystem one) maps them
/// to a location under its root.
pub fn validate_key(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey("key must not be empty".to_string()));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_layout_keys() {
        assert!(validate_key("projects/demo/specs/abc.json").is_ok());
        assert!(validate_key("projects/demo/images/logo.png").is_ok());
    }

    #[test]
    fn rejects_traversal_and_absolute_keys() {
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("projects/../secrets").is_err());
        assert!(validate_key("projects//double").is_err());
        assert!(validate_key("projects\\win").is_err());
    }
}
