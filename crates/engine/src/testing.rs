//! Test fixtures: an in-memory store implementation.
//!
//! Compiled for this crate's tests and, via the `test-utils` feature, for
//! downstream integration tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::store::{Store, StoreError, StoreResult};

/// In-memory [`Store`] backed by a sorted map.
///
/// Thread-safe, supports prefix listing, and can be switched into a failing
/// mode to exercise storage error paths.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
    fail: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every subsequent operation fail (or stop failing).
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// Number of `put` calls performed so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Raw snapshot of a stored value.
    pub async fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.read().await.get(key).cloned()
    }

    /// Overwrite a value without going through the engine.
    pub async fn put_raw(&self, key: &str, value: Vec<u8>) {
        self.entries.write().await.insert(key.to_string(), value);
    }

    fn check(&self, operation: &'static str) -> StoreResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            Err(StoreError::new(operation, "memory store is in failing mode"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.check("get")?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        self.check("put")?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.check("delete")?;
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.check("list")?;
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key[prefix.len()..].to_string())
            .collect())
    }
}
