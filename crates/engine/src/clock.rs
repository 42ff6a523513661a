//! Wall-clock seam.
//!
//! Expiry arithmetic runs against this trait instead of `Utc::now()` so
//! tests can move time without sleeping. Scheduler sleeps still use the
//! tokio timer; only decisions about token lifetimes go through the clock.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// Real system clock; use in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for deterministic tests.
///
/// Starts at the real current time and only moves when told to, so tokens
/// issued against the real clock line up with it.
#[derive(Debug)]
pub struct MockClock {
    base: DateTime<Utc>,
    offset: Mutex<Duration>,
}

impl MockClock {
    /// Create a clock pinned at the current real time.
    pub fn new() -> Self {
        Self { base: Utc::now(), offset: Mutex::new(Duration::zero()) }
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut offset = self.offset.lock().expect("mock clock offset poisoned");
        *offset += delta;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + *self.offset.lock().expect("mock clock offset poisoned")
    }
}
