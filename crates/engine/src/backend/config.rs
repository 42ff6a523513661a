//! Configuration operations.

use tokensmith_provider::LATEST_VERSION;
use tracing::{info, instrument};

use super::requests::{
    AuthCodeUrlRequest, AuthCodeUrlResponse, ConfigReadResponse, ConfigUpdateRequest,
};
use super::Backend;
use crate::error::{EngineError, EngineResult};
use crate::persistence::{keys, ConfigEntry, CONFIG_VERSION_LATEST};

impl Backend {
    /// Read the current configuration, without the client secret.
    pub async fn config_read(&self) -> EngineResult<Option<ConfigReadResponse>> {
        let Some(bundle) = self.bundle().await? else {
            return Ok(None);
        };
        let config = &bundle.config;
        Ok(Some(ConfigReadResponse {
            client_id: config.client_id.clone(),
            auth_url_params: config.auth_url_params.clone(),
            provider: config.provider_name.clone(),
            provider_version: config.provider_version,
            provider_options: config.provider_options.clone(),
            tuning: config.tuning.clone(),
        }))
    }

    /// Create or replace the configuration.
    ///
    /// Validates the tuning bounds, builds the provider once to validate its
    /// options, pins the provider version it reports, then resets the cache
    /// and background workers.
    #[instrument(skip_all, fields(provider = %request.provider))]
    pub async fn config_update(&self, request: ConfigUpdateRequest) -> EngineResult<()> {
        if request.client_id.is_empty() {
            return Err(EngineError::user("missing client ID"));
        }
        if request.provider.is_empty() {
            return Err(EngineError::user("missing provider"));
        }
        request.tuning.validate().map_err(EngineError::User)?;

        let provider =
            self.registry.build(&request.provider, LATEST_VERSION, &request.provider_options)?;

        let entry = ConfigEntry {
            version: CONFIG_VERSION_LATEST,
            client_id: request.client_id,
            client_secret: request.client_secret,
            auth_url_params: request.auth_url_params,
            provider_name: request.provider,
            provider_version: provider.version(),
            provider_options: request.provider_options,
            tuning: request.tuning,
        };
        self.store.put(keys::CONFIG, entry.encode()?).await?;

        info!(provider_version = entry.provider_version, "configuration written");
        self.reset().await
    }

    /// Delete the configuration.
    ///
    /// Stored credentials are left untouched; they remain readable but
    /// cannot be refreshed until the mount is reconfigured.
    pub async fn config_delete(&self) -> EngineResult<()> {
        self.store.delete(keys::CONFIG).await?;
        info!("configuration deleted");
        self.reset().await
    }

    /// Compose an authorization code URL from the configuration and the
    /// request. Configured `auth_url_params` overlay the request's.
    pub async fn auth_code_url(
        &self,
        request: AuthCodeUrlRequest,
    ) -> EngineResult<AuthCodeUrlResponse> {
        let bundle = self.require_bundle().await?;
        if request.state.is_empty() {
            return Err(EngineError::user("missing state"));
        }

        let mut builder = bundle
            .provider
            .auth_code_url_builder(&bundle.config.client_id)
            .ok_or_else(|| EngineError::user("authorization code URL not available"))?
            .with_scopes(request.scopes)
            .with_url_params(request.auth_url_params)
            .with_url_params(bundle.config.auth_url_params.clone())
            .with_provider_options(request.provider_options);
        if let Some(redirect_url) = request.redirect_url {
            builder = builder.with_redirect_url(redirect_url);
        }

        Ok(AuthCodeUrlResponse { url: builder.build().auth_code_url(&request.state) })
    }
}
