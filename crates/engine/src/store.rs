//! Host storage contract.
//!
//! The mounting host supplies the key/value backend; the engine only ever
//! sees this trait. Values are opaque bytes (the persistence layer owns the
//! encoding), keys are `/`-separated paths under the mount. The store is
//! expected to be internally thread-safe; the engine serializes writes per
//! entity with its own lock table and never asks the store for atomicity
//! beyond a single call.

use async_trait::async_trait;
use thiserror::Error;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure in the host storage backend.
///
/// Fatal to the current operation, never to the process.
#[derive(Debug, Error)]
#[error("storage {operation} failed: {message}")]
pub struct StoreError {
    pub operation: &'static str,
    pub message: String,
}

impl StoreError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self { operation, message: message.into() }
    }
}

/// Key/value storage supplied by the host.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read the value at `key`, or `None` if absent.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Write `value` at `key`, replacing any existing value.
    async fn put(&self, key: &str, value: Vec<u8>) -> StoreResult<()>;

    /// Delete the value at `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// List the key suffixes stored under `prefix`, sorted.
    ///
    /// A key `creds/alice` shows up in `list("creds/")` as `alice`. Suffixes
    /// may themselves contain `/`; callers treat them as opaque names.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>>;
}
