//! Background control loops.
//!
//! Two long-running workers keep stored credentials healthy: the refresh
//! loop renews tokens before they expire, the reap loop deletes credentials
//! that cannot be revived. Both follow the same lifecycle:
//!
//! - spawned against a specific configuration bundle; a reset stops the old
//!   workers (and waits for them) before starting new ones, so no worker
//!   ever observes a stale cache
//! - cancellation is cooperative: observed between items, never mid-item
//! - per-item failures are logged and recorded, never fatal to the sweep
//!
//! Sweep sleeps carry a small jitter so several mounts sharing an
//! authorization server spread their load.

pub(crate) mod reap;
pub(crate) mod refresh;

use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Jitter applied to sweep intervals, as a fraction of the interval.
const SWEEP_JITTER_FACTOR: f64 = 0.1;

/// How long a stopping scheduler is given to finish its current item.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A running background worker.
pub(crate) struct SchedulerHandle {
    name: &'static str,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl SchedulerHandle {
    pub(crate) fn new(
        name: &'static str,
        cancel: CancellationToken,
        handle: JoinHandle<()>,
    ) -> Self {
        Self { name, cancel, handle }
    }

    /// Cancel the worker and wait for it to finish its current item.
    pub(crate) async fn shutdown(self) {
        self.cancel.cancel();
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, self.handle).await.is_err() {
            warn!(scheduler = self.name, "scheduler did not stop within the shutdown timeout");
        }
    }
}

/// Sleep duration for the next sweep: `interval` within ±10% jitter.
pub(crate) fn jittered(interval: Duration) -> Duration {
    let base = interval.as_secs_f64();
    let spread = base * SWEEP_JITTER_FACTOR;
    if spread <= f64::EPSILON {
        return interval;
    }
    let offset = rand::thread_rng().gen_range(-spread..spread);
    Duration::from_secs_f64((base + offset).max(0.0))
}
