//! Memoized (config, provider) bundle.
//!
//! Nearly every operation needs the decoded configuration and a provider
//! built from it; the cache loads that pair lazily once and shares it until
//! a reset invalidates it. The bundle is immutable while live — reset swaps
//! the whole slot, never mutates in place — so concurrent readers share one
//! `Arc` without coordination.

use std::sync::Arc;

use tokensmith_provider::{Provider, Registry, RegistryError};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::persistence::{keys, ConfigEntry};
use crate::store::Store;

/// The configuration and the provider instance built from it.
pub struct Bundle {
    pub config: ConfigEntry,
    pub provider: Arc<dyn Provider>,
}

/// Lazily populated cache of the current [`Bundle`].
#[derive(Default)]
pub struct ConfigCache {
    slot: RwLock<Option<Arc<Bundle>>>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the current bundle, loading it from the store on first use.
    ///
    /// `Ok(None)` means the mount is not configured. If the pinned provider
    /// version is no longer registered, every call fails with
    /// [`EngineError::ProviderVersionUnavailable`] until reconfiguration.
    pub async fn bundle(
        &self,
        store: &dyn Store,
        registry: &Registry,
    ) -> EngineResult<Option<Arc<Bundle>>> {
        if let Some(bundle) = self.slot.read().await.clone() {
            return Ok(Some(bundle));
        }

        let mut slot = self.slot.write().await;
        // Raced with another loader; theirs wins.
        if let Some(bundle) = slot.clone() {
            return Ok(Some(bundle));
        }

        let Some(bytes) = store.get(keys::CONFIG).await? else {
            return Ok(None);
        };
        let config = ConfigEntry::decode(&bytes)?;

        let provider = registry
            .build(&config.provider_name, config.provider_version, &config.provider_options)
            .map_err(|err| match err {
                RegistryError::NoSuchProviderVersion { name, version } => {
                    EngineError::ProviderVersionUnavailable { name, version }
                }
                other => EngineError::from(other),
            })?;

        debug!(
            provider = %config.provider_name,
            provider_version = config.provider_version,
            "configuration bundle loaded"
        );

        let bundle = Arc::new(Bundle { config, provider });
        *slot = Some(Arc::clone(&bundle));
        Ok(Some(bundle))
    }

    /// Drop the cached bundle; the next call reloads from the store.
    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }
}
