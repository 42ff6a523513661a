//! Expired-credential reap loop.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{jittered, SchedulerHandle};
use crate::cache::Bundle;
use crate::credentials::CredentialManager;

/// Spawn the reap worker for `bundle`, or `None` when the configured
/// interval disables the loop.
pub(crate) fn spawn(
    manager: Arc<CredentialManager>,
    bundle: Arc<Bundle>,
) -> Option<SchedulerHandle> {
    let interval_seconds = bundle.config.tuning.reap_check_interval_seconds;
    if interval_seconds == 0 {
        return None;
    }

    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
        run(manager, bundle, interval_seconds, worker_cancel).await;
    });

    Some(SchedulerHandle::new("reap", cancel, handle))
}

async fn run(
    manager: Arc<CredentialManager>,
    bundle: Arc<Bundle>,
    interval_seconds: u64,
    cancel: CancellationToken,
) {
    let interval = Duration::from_secs(interval_seconds);
    let tuning = &bundle.config.tuning;

    debug!(interval_seconds, dry_run = tuning.reap_dry_run, "reap loop started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(jittered(interval)) => {}
        }

        let names = match manager.list().await {
            Ok(names) => names,
            Err(err) => {
                warn!(error = %err, "reap sweep could not list credentials");
                continue;
            }
        };

        for name in names {
            if cancel.is_cancelled() {
                debug!("reap loop cancelled mid-sweep");
                return;
            }

            // Deletions and dry-run reports are logged where they happen;
            // only sweep-level failures need attention here.
            if let Err(err) = manager.reap_one(tuning, &name).await {
                warn!(credential = %name, error = %err, "reap sweep item errored");
            }
        }
    }
    debug!("reap loop stopped");
}
