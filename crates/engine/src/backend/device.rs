//! Device authorization operations (RFC 8628).
//!
//! `device/auth` starts a flow and persists the pending authorization under
//! `devices/<name>`; the caller shows the user code and polls
//! `device/exchange` until the grant terminates. A successful grant
//! materializes `creds/<name>` like any other credential.

use tokensmith_provider::DevicePoll;
use tracing::{info, instrument};

use super::requests::{
    CredentialResponse, DeviceAuthOpRequest, DeviceAuthOpResponse, DeviceExchangeOpRequest,
    DeviceExchangeOpResponse,
};
use super::Backend;
use crate::error::{EngineError, EngineResult};
use crate::persistence::{keys, DeviceAuthEntry};

/// Extra polling delay imposed after a `slow_down` response (RFC 8628 §3.5).
const SLOW_DOWN_PENALTY_SECONDS: u64 = 5;

impl Backend {
    /// Start a device authorization and persist the pending entry.
    #[instrument(skip_all, fields(credential = %request.name))]
    pub async fn device_auth(
        &self,
        request: DeviceAuthOpRequest,
    ) -> EngineResult<DeviceAuthOpResponse> {
        if request.name.is_empty() {
            return Err(EngineError::user("missing credential name"));
        }
        let bundle = self.require_bundle().await?;

        let auth = self
            .credentials
            .exchange_config(&bundle, false)
            .device_auth(&request.scopes)
            .await?;

        let entry = DeviceAuthEntry::new(
            request.name.clone(),
            bundle.config.client_id.clone(),
            auth,
            request.scopes,
            request.provider_options,
        );

        let key = keys::device(&request.name);
        {
            let _lock = self.locks.acquire(&key).await;
            self.store.put(&key, entry.encode()?).await?;
        }
        info!(credential = %request.name, "device authorization started");

        let expires_in =
            entry.expires_at.map(|expires_at| (expires_at - self.clock.now()).num_seconds());
        Ok(DeviceAuthOpResponse {
            device_code: entry.device_code,
            user_code: entry.user_code,
            verification_uri: entry.verification_uri,
            verification_uri_complete: entry.verification_uri_complete,
            interval: entry.interval_seconds,
            expires_in,
        })
    }

    /// Poll a pending device authorization once.
    ///
    /// Terminal outcomes (grant, denial, expiry) remove the pending entry;
    /// a grant additionally materializes the credential.
    #[instrument(skip_all, fields(credential = %request.name))]
    pub async fn device_exchange(
        &self,
        request: DeviceExchangeOpRequest,
    ) -> EngineResult<DeviceExchangeOpResponse> {
        let bundle = self.require_bundle().await?;
        let key = keys::device(&request.name);

        let mut entry = {
            let _lock = self.locks.acquire(&key).await;
            match self.store.get(&key).await? {
                Some(bytes) => DeviceAuthEntry::decode(&bytes)?,
                None => {
                    return Err(EngineError::user(format!(
                        "no pending device authorization for {:?}",
                        request.name
                    )))
                }
            }
        };

        if entry.expired(self.clock.now()) {
            let _lock = self.locks.acquire(&key).await;
            self.store.delete(&key).await?;
            return Err(EngineError::user("device authorization expired"));
        }

        // The poll itself runs without any lock held.
        let poll = self
            .credentials
            .exchange_config(&bundle, false)
            .device_exchange(&entry.device_code)
            .await;

        match poll {
            Ok(DevicePoll::Granted(token)) => {
                let credential = self.credentials.put_issued(&request.name, token).await?;
                {
                    let _lock = self.locks.acquire(&key).await;
                    self.store.delete(&key).await?;
                }
                info!(credential = %request.name, "device authorization granted");
                Ok(DeviceExchangeOpResponse::Issued(CredentialResponse::from_entry(
                    &credential,
                    None,
                )))
            }
            Ok(DevicePoll::Pending) => {
                Ok(DeviceExchangeOpResponse::Pending { interval: entry.interval_seconds })
            }
            Ok(DevicePoll::SlowDown) => {
                entry.interval_seconds += SLOW_DOWN_PENALTY_SECONDS;
                {
                    let _lock = self.locks.acquire(&key).await;
                    self.store.put(&key, entry.encode()?).await?;
                }
                Ok(DeviceExchangeOpResponse::Pending { interval: entry.interval_seconds })
            }
            Err(err) if err.is_permanent() => {
                // Denied or expired server-side; the pending entry is dead.
                let _lock = self.locks.acquire(&key).await;
                self.store.delete(&key).await?;
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }
}
