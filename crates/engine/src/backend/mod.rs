//! The engine backend: operation surface and lifecycle.
//!
//! One [`Backend`] exists per mount. The host constructs it with its storage
//! backend and a provider registry, calls [`Backend::initialize`] after
//! mounting, routes typed requests to the operation methods, and calls
//! [`Backend::shutdown`] before unmounting.
//!
//! Any configuration mutation funnels through [`Backend::reset`]: stop the
//! background workers (waiting for them to finish their current item), drop
//! the cached bundle, and relaunch the workers under the new configuration.
//! The stop-before-start ordering is what guarantees no worker ever writes
//! on behalf of a configuration that has been replaced.

mod config;
mod creds;
mod device;
mod requests;
mod self_ops;

pub use requests::{
    AuthCodeUrlRequest, AuthCodeUrlResponse, ConfigReadResponse, ConfigUpdateRequest,
    CredentialReadRequest, CredentialResponse, CredentialWriteRequest, DeviceAuthOpRequest,
    DeviceAuthOpResponse, DeviceExchangeOpRequest, DeviceExchangeOpResponse, SelfWriteRequest,
    StsRequest, StsResponse,
};

use std::sync::Arc;

use tokensmith_provider::Registry;
use tokio::sync::Mutex as AsyncMutex;
use tracing::info;

use crate::cache::{Bundle, ConfigCache};
use crate::clock::{Clock, SystemClock};
use crate::credentials::CredentialManager;
use crate::error::{EngineError, EngineResult};
use crate::locking::LockTable;
use crate::scheduling::{reap, refresh, SchedulerHandle};
use crate::store::Store;

/// The credential lifecycle core of one mount.
pub struct Backend {
    store: Arc<dyn Store>,
    registry: Arc<Registry>,
    clock: Arc<dyn Clock>,
    cache: ConfigCache,
    locks: Arc<LockTable>,
    credentials: Arc<CredentialManager>,
    schedulers: AsyncMutex<Vec<SchedulerHandle>>,
}

impl Backend {
    /// Build a backend on the system clock.
    pub fn new(store: Arc<dyn Store>, registry: Arc<Registry>) -> Self {
        Self::with_clock(store, registry, Arc::new(SystemClock))
    }

    /// Build a backend with an explicit clock (tests use [`crate::clock::MockClock`]).
    pub fn with_clock(
        store: Arc<dyn Store>,
        registry: Arc<Registry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let locks = LockTable::new();
        let credentials = Arc::new(CredentialManager::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            Arc::clone(&locks),
        ));

        Self {
            store,
            registry,
            clock,
            cache: ConfigCache::new(),
            locks,
            credentials,
            schedulers: AsyncMutex::new(Vec::new()),
        }
    }

    /// Start the background workers if the mount is already configured.
    ///
    /// Fails (and leaves the workers stopped) when the stored configuration
    /// pins a provider version the registry no longer offers; the mount
    /// stays usable for reconfiguration only.
    pub async fn initialize(&self) -> EngineResult<()> {
        self.reset().await
    }

    /// Stop the background workers and wait for them.
    pub async fn shutdown(&self) {
        let mut schedulers = self.schedulers.lock().await;
        for handle in schedulers.drain(..) {
            handle.shutdown().await;
        }
        info!("backend shut down");
    }

    /// Quiesce workers started under the previous configuration, drop the
    /// cached bundle, and relaunch under the current one.
    pub(crate) async fn reset(&self) -> EngineResult<()> {
        let mut schedulers = self.schedulers.lock().await;
        for handle in schedulers.drain(..) {
            handle.shutdown().await;
        }
        self.cache.invalidate().await;

        if let Some(bundle) = self.bundle().await? {
            let manager = Arc::clone(&self.credentials);
            if let Some(handle) = refresh::spawn(Arc::clone(&manager), Arc::clone(&bundle)) {
                schedulers.push(handle);
            }
            if let Some(handle) = reap::spawn(manager, bundle) {
                schedulers.push(handle);
            }
        }
        Ok(())
    }

    /// The current (config, provider) bundle, or `None` when unconfigured.
    pub(crate) async fn bundle(&self) -> EngineResult<Option<Arc<Bundle>>> {
        self.cache.bundle(self.store.as_ref(), &self.registry).await
    }

    /// The current bundle, or [`EngineError::NotConfigured`].
    pub(crate) async fn require_bundle(&self) -> EngineResult<Arc<Bundle>> {
        self.bundle().await?.ok_or(EngineError::NotConfigured)
    }
}
