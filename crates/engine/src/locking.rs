//! Per-entity lock table.
//!
//! Writes to any one storage entity are serialized by acquiring its lock
//! here first; distinct entities proceed in parallel. Slots are
//! reference-counted so the table does not grow with the credential count —
//! a slot exists only while someone holds or waits for it. The underlying
//! tokio mutex hands the lock out in FIFO order, so background sweeps cannot
//! starve interactive reads.
//!
//! Each caller acquires at most one lock, which makes deadlock structurally
//! impossible.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

struct Slot {
    lock: Arc<AsyncMutex<()>>,
    /// Holders plus waiters; the slot is removed when this reaches zero.
    interested: usize,
}

/// Map from entity key to its mutex.
#[derive(Default)]
pub struct LockTable {
    slots: StdMutex<HashMap<String, Slot>>,
}

impl LockTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Acquire the lock for `key`, waiting FIFO behind current holders.
    pub async fn acquire(self: &Arc<Self>, key: &str) -> KeyLock {
        let lock = {
            let mut slots = self.slots.lock().expect("lock table poisoned");
            let slot = slots
                .entry(key.to_string())
                .or_insert_with(|| Slot { lock: Arc::new(AsyncMutex::new(())), interested: 0 });
            slot.interested += 1;
            Arc::clone(&slot.lock)
        };

        let guard = lock.lock_owned().await;
        KeyLock { table: Arc::clone(self), key: key.to_string(), guard: Some(guard) }
    }

    fn release(&self, key: &str) {
        let mut slots = self.slots.lock().expect("lock table poisoned");
        if let Some(slot) = slots.get_mut(key) {
            slot.interested -= 1;
            if slot.interested == 0 {
                slots.remove(key);
            }
        }
    }

    /// Number of live slots; diagnostics and tests only.
    pub fn len(&self) -> usize {
        self.slots.lock().expect("lock table poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held lock for one entity key; released on drop.
pub struct KeyLock {
    table: Arc<LockTable>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyLock {
    fn drop(&mut self) {
        // Release the mutex before the slot refcount so a waiter observing
        // the freed mutex still finds the slot present.
        self.guard.take();
        self.table.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_key_is_mutually_exclusive() {
        let table = LockTable::new();
        let in_section = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let table = Arc::clone(&table);
            let in_section = Arc::clone(&in_section);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _lock = table.acquire("creds/alice").await;
                let current = in_section.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_section.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn distinct_keys_proceed_in_parallel() {
        let table = LockTable::new();

        let lock_a = table.acquire("creds/alice").await;
        // A second key must not wait behind the first.
        let lock_b = tokio::time::timeout(Duration::from_millis(50), table.acquire("creds/bob"))
            .await
            .expect("distinct key acquired without waiting");

        assert_eq!(table.len(), 2);
        drop(lock_a);
        drop(lock_b);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn slots_are_reclaimed_after_contention() {
        let table = LockTable::new();

        let held = table.acquire("creds/alice").await;
        let waiter = {
            let table = Arc::clone(&table);
            tokio::spawn(async move {
                let _lock = table.acquire("creds/alice").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(table.len(), 1);

        drop(held);
        waiter.await.unwrap();
        assert!(table.is_empty());
    }
}
