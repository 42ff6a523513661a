//! Proactive refresh loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{jittered, SchedulerHandle};
use crate::cache::Bundle;
use crate::credentials::{CredentialManager, RefreshOutcome};

/// Spawn the refresh worker for `bundle`, or `None` when the configured
/// interval disables the loop.
pub(crate) fn spawn(
    manager: Arc<CredentialManager>,
    bundle: Arc<Bundle>,
) -> Option<SchedulerHandle> {
    let interval_seconds = bundle.config.tuning.refresh_check_interval_seconds;
    if interval_seconds == 0 {
        return None;
    }

    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
        run(manager, bundle, interval_seconds, worker_cancel).await;
    });

    Some(SchedulerHandle::new("refresh", cancel, handle))
}

async fn run(
    manager: Arc<CredentialManager>,
    bundle: Arc<Bundle>,
    interval_seconds: u64,
    cancel: CancellationToken,
) {
    let interval = Duration::from_secs(interval_seconds);
    // How far ahead of expiry a sweep refreshes: tokens that would lapse
    // before the next sweep (scaled by the delta factor) are due now.
    let window = ChronoDuration::seconds(
        (interval_seconds as f64 * bundle.config.tuning.refresh_expiry_delta_factor) as i64,
    );

    debug!(interval_seconds, "refresh loop started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(jittered(interval)) => {}
        }

        let names = match manager.list().await {
            Ok(names) => names,
            Err(err) => {
                warn!(error = %err, "refresh sweep could not list credentials");
                continue;
            }
        };

        for name in names {
            // Cooperative cancellation: finish the current item, then exit.
            if cancel.is_cancelled() {
                debug!("refresh loop cancelled mid-sweep");
                return;
            }

            match manager.refresh_due(&bundle, &name, window).await {
                Ok(RefreshOutcome::Refreshed) => {
                    debug!(credential = %name, "background refresh succeeded");
                }
                Ok(RefreshOutcome::Failed(message)) => {
                    warn!(credential = %name, error = %message, "background refresh failed");
                }
                Ok(_skipped) => {}
                Err(err) => {
                    warn!(credential = %name, error = %err, "refresh sweep item errored");
                }
            }
        }
    }
    debug!("refresh loop stopped");
}
