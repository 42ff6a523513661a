//! Credential operations.

use tracing::instrument;

use super::requests::{
    CredentialReadRequest, CredentialResponse, CredentialWriteRequest, StsRequest, StsResponse,
};
use super::Backend;
use crate::error::{EngineError, EngineResult};

impl Backend {
    /// Create or replace a credential: exchange an authorization code, or
    /// seed from a bare refresh token.
    #[instrument(skip_all, fields(credential = %request.name))]
    pub async fn credential_write(&self, request: CredentialWriteRequest) -> EngineResult<()> {
        if request.name.is_empty() {
            return Err(EngineError::user("missing credential name"));
        }

        let bundle = self.require_bundle().await?;

        match (&request.code, &request.refresh_token) {
            (Some(_), Some(_)) => {
                Err(EngineError::user("cannot specify both code and refresh_token"))
            }
            (Some(code), None) => {
                self.credentials
                    .write_exchanged(
                        &bundle,
                        &request.name,
                        code,
                        request.redirect_url.as_deref(),
                        &request.auth_url_params,
                        &request.provider_options,
                    )
                    .await?;
                Ok(())
            }
            (None, Some(refresh_token)) => {
                if refresh_token.is_empty() {
                    return Err(EngineError::user("refresh_token may not be empty"));
                }
                self.credentials.seed(&request.name, refresh_token).await?;
                Ok(())
            }
            (None, None) => Err(EngineError::user("missing code or refresh_token")),
        }
    }

    /// Read a credential's current token, refreshing synchronously when the
    /// stored token cannot satisfy the requested validity window.
    pub async fn credential_read(
        &self,
        request: CredentialReadRequest,
    ) -> EngineResult<Option<CredentialResponse>> {
        let bundle = self.require_bundle().await?;
        let outcome =
            self.credentials.read(&bundle, &request.name, request.minimum_seconds).await?;
        Ok(outcome
            .map(|outcome| CredentialResponse::from_entry(&outcome.entry, outcome.refresh_warning)))
    }

    /// Delete a credential. Deleting an absent credential is not an error.
    pub async fn credential_delete(&self, name: &str) -> EngineResult<()> {
        self.credentials.delete(name).await?;
        Ok(())
    }

    /// List stored credential names.
    pub async fn credential_list(&self) -> EngineResult<Vec<String>> {
        self.credentials.list().await
    }

    /// RFC 8693: exchange the named credential's access token for one aimed
    /// at a different audience or scope set. The stored credential is
    /// refreshed first if it is due, and is never modified by the exchange
    /// itself.
    #[instrument(skip_all, fields(credential = %request.name))]
    pub async fn sts_exchange(&self, request: StsRequest) -> EngineResult<StsResponse> {
        let bundle = self.require_bundle().await?;

        let outcome = self
            .credentials
            .read(&bundle, &request.name, None)
            .await?
            .ok_or_else(|| EngineError::user(format!("credential {:?} not found", request.name)))?;

        let subject = &outcome.entry.token.access_token;
        if subject.is_empty() {
            return Err(EngineError::user(format!(
                "credential {:?} has no access token to exchange",
                request.name
            )));
        }

        let exchanged = self
            .credentials
            .exchange_config(&bundle, false)
            .token_exchange(subject, request.audience.as_deref(), &request.scopes)
            .await?;

        Ok(StsResponse {
            access_token: exchanged.access_token.clone(),
            token_type: exchanged.token_type().to_string(),
            expiry: exchanged.expiry,
        })
    }
}
