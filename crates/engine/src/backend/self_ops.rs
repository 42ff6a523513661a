//! Client-credentials ("self") operations.
//!
//! A self credential is a token the engine maintains for the configured
//! OAuth client itself. There is no refresh token; renewal is simply
//! another client-credentials grant with the stored scopes, performed
//! synchronously on read when the stored token falls short. The background
//! loops do not visit these entries.

use chrono::Duration;
use tracing::{info, instrument};

use super::requests::{CredentialReadRequest, CredentialResponse, SelfWriteRequest};
use super::Backend;
use crate::error::{EngineError, EngineResult};
use crate::persistence::{keys, SelfCredentialEntry};

impl Backend {
    /// Issue and store a token for the client itself under the requested
    /// scopes.
    #[instrument(skip_all, fields(credential = %request.name))]
    pub async fn self_write(&self, request: SelfWriteRequest) -> EngineResult<()> {
        if request.name.is_empty() {
            return Err(EngineError::user("missing credential name"));
        }
        let bundle = self.require_bundle().await?;

        let token = self
            .credentials
            .exchange_config(&bundle, false)
            .client_credentials(&request.scopes)
            .await?;

        let entry = SelfCredentialEntry::issued(token, request.scopes, self.clock.now());
        let key = keys::self_credential(&request.name);
        let _lock = self.locks.acquire(&key).await;
        self.store.put(&key, entry.encode()?).await?;
        info!(credential = %request.name, "self credential issued");
        Ok(())
    }

    /// Read the self credential, re-issuing synchronously when the stored
    /// token cannot satisfy the requested validity window.
    pub async fn self_read(
        &self,
        request: CredentialReadRequest,
    ) -> EngineResult<Option<CredentialResponse>> {
        let bundle = self.require_bundle().await?;
        let key = keys::self_credential(&request.name);
        let _lock = self.locks.acquire(&key).await;

        let Some(bytes) = self.store.get(&key).await? else {
            return Ok(None);
        };
        let mut entry = SelfCredentialEntry::decode(&bytes)?;
        let now = self.clock.now();

        let window = Duration::seconds(request.minimum_seconds.unwrap_or(0) as i64);
        if entry.token.valid_for(now, window) {
            return Ok(Some(CredentialResponse::from_self_entry(&entry)));
        }

        let expired = entry.token.expired(now);
        let token = self
            .credentials
            .exchange_config(&bundle, expired)
            .client_credentials(&entry.scopes)
            .await?;

        entry = SelfCredentialEntry::issued(token, entry.scopes, now);
        self.store.put(&key, entry.encode()?).await?;
        Ok(Some(CredentialResponse::from_self_entry(&entry)))
    }

    /// Delete the self credential.
    pub async fn self_delete(&self, name: &str) -> EngineResult<()> {
        let key = keys::self_credential(name);
        let _lock = self.locks.acquire(&key).await;
        self.store.delete(&key).await?;
        Ok(())
    }
}
