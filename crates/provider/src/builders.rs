//! Builder surface for provider operations.
//!
//! Builders are plain values: they close over the client credentials, merged
//! URL parameters, provider options, and HTTP timeout, and finalize into
//! immutable configs. This keeps option plumbing out of the engine's fast
//! path — an [`ExchangeConfig`] built once per operation carries everything a
//! flow needs.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::ProviderResult;
use crate::token::{DeviceAuth, DevicePoll, Token};
use crate::traits::{
    AuthCodeExchange, ClientCredentialsExchange, DeviceAuthRequest, DeviceExchangeRequest,
    Provider, RefreshExchange, TokenExchangeRequest,
};

/// Builder for browser authorization URLs.
///
/// Created by [`Provider::auth_code_url_builder`]; the provider supplies the
/// authorization endpoint, the caller layers on everything else.
#[derive(Debug, Clone)]
pub struct AuthCodeUrlBuilder {
    endpoint: Url,
    client_id: String,
    redirect_url: Option<String>,
    scopes: Vec<String>,
    url_params: BTreeMap<String, String>,
    provider_options: BTreeMap<String, String>,
}

impl AuthCodeUrlBuilder {
    /// Start a builder for the given authorization endpoint and client.
    pub fn new(endpoint: Url, client_id: impl Into<String>) -> Self {
        Self {
            endpoint,
            client_id: client_id.into(),
            redirect_url: None,
            scopes: Vec::new(),
            url_params: BTreeMap::new(),
            provider_options: BTreeMap::new(),
        }
    }

    pub fn with_redirect_url(mut self, redirect_url: impl Into<String>) -> Self {
        self.redirect_url = Some(redirect_url.into());
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    /// Merge query parameters into the URL. Parameters applied later win,
    /// so callers can overlay configured values over per-request ones.
    pub fn with_url_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in params {
            self.url_params.insert(key.into(), value.into());
        }
        self
    }

    pub fn with_provider_options<I, K, V>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in options {
            self.provider_options.insert(key.into(), value.into());
        }
        self
    }

    /// Finalize into an immutable config.
    pub fn build(self) -> AuthCodeUrlConfig {
        AuthCodeUrlConfig {
            endpoint: self.endpoint,
            client_id: self.client_id,
            redirect_url: self.redirect_url,
            scopes: self.scopes,
            url_params: self.url_params,
        }
    }
}

/// Finalized authorization URL configuration.
#[derive(Debug, Clone)]
pub struct AuthCodeUrlConfig {
    endpoint: Url,
    client_id: String,
    redirect_url: Option<String>,
    scopes: Vec<String>,
    url_params: BTreeMap<String, String>,
}

impl AuthCodeUrlConfig {
    /// Render the authorization URL for the given CSRF `state`.
    pub fn auth_code_url(&self, state: &str) -> String {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("response_type", "code");
            query.append_pair("client_id", &self.client_id);
            if let Some(redirect_url) = &self.redirect_url {
                query.append_pair("redirect_uri", redirect_url);
            }
            if !self.scopes.is_empty() {
                query.append_pair("scope", &self.scopes.join(" "));
            }
            query.append_pair("state", state);
            for (key, value) in &self.url_params {
                query.append_pair(key, value);
            }
        }
        url.into()
    }
}

/// Builder for the per-operation exchange surface.
#[derive(Clone)]
pub struct ExchangeBuilder {
    provider: Arc<dyn Provider>,
    client_id: String,
    client_secret: String,
    redirect_url: Option<String>,
    url_params: BTreeMap<String, String>,
    provider_options: BTreeMap<String, String>,
    timeout: Option<Duration>,
}

impl ExchangeBuilder {
    /// Start a builder bound to a provider and client credentials.
    pub fn new(
        provider: Arc<dyn Provider>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_url: None,
            url_params: BTreeMap::new(),
            provider_options: BTreeMap::new(),
            timeout: None,
        }
    }

    pub fn with_redirect_url(mut self, redirect_url: impl Into<String>) -> Self {
        self.redirect_url = Some(redirect_url.into());
        self
    }

    /// Merge extra form parameters into token requests; later entries win.
    pub fn with_url_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in params {
            self.url_params.insert(key.into(), value.into());
        }
        self
    }

    pub fn with_provider_options<I, K, V>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in options {
            self.provider_options.insert(key.into(), value.into());
        }
        self
    }

    /// Cap each outward HTTP call at `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Finalize into an immutable config.
    pub fn build(self) -> ExchangeConfig {
        ExchangeConfig {
            provider: self.provider,
            client_id: self.client_id,
            client_secret: self.client_secret,
            redirect_url: self.redirect_url,
            url_params: self.url_params,
            provider_options: self.provider_options,
            timeout: self.timeout,
        }
    }
}

/// Finalized exchange configuration; one value drives every grant type.
#[derive(Clone)]
pub struct ExchangeConfig {
    provider: Arc<dyn Provider>,
    client_id: String,
    client_secret: String,
    redirect_url: Option<String>,
    url_params: BTreeMap<String, String>,
    provider_options: BTreeMap<String, String>,
    timeout: Option<Duration>,
}

impl ExchangeConfig {
    /// Exchange an authorization code for a token.
    pub async fn exchange(&self, code: &str) -> ProviderResult<Token> {
        self.provider
            .exchange(&AuthCodeExchange {
                client_id: self.client_id.clone(),
                client_secret: self.client_secret.clone(),
                code: code.to_string(),
                redirect_url: self.redirect_url.clone(),
                url_params: self.url_params.clone(),
                provider_options: self.provider_options.clone(),
                timeout: self.timeout,
            })
            .await
    }

    /// Refresh the given token.
    pub async fn refresh(&self, token: &Token) -> ProviderResult<Token> {
        self.provider
            .refresh(&RefreshExchange {
                client_id: self.client_id.clone(),
                client_secret: self.client_secret.clone(),
                token: token.clone(),
                provider_options: self.provider_options.clone(),
                timeout: self.timeout,
            })
            .await
    }

    /// Issue a token for the configured client itself.
    pub async fn client_credentials(&self, scopes: &[String]) -> ProviderResult<Token> {
        self.provider
            .client_credentials(&ClientCredentialsExchange {
                client_id: self.client_id.clone(),
                client_secret: self.client_secret.clone(),
                scopes: scopes.to_vec(),
                provider_options: self.provider_options.clone(),
                timeout: self.timeout,
            })
            .await
    }

    /// Begin a device authorization.
    pub async fn device_auth(&self, scopes: &[String]) -> ProviderResult<DeviceAuth> {
        self.provider
            .device_auth(&DeviceAuthRequest {
                client_id: self.client_id.clone(),
                scopes: scopes.to_vec(),
                provider_options: self.provider_options.clone(),
                timeout: self.timeout,
            })
            .await
    }

    /// Poll a pending device authorization once.
    pub async fn device_exchange(&self, device_code: &str) -> ProviderResult<DevicePoll> {
        self.provider
            .device_exchange(&DeviceExchangeRequest {
                client_id: self.client_id.clone(),
                client_secret: self.client_secret.clone(),
                device_code: device_code.to_string(),
                timeout: self.timeout,
            })
            .await
    }

    /// Swap `subject_token` for a token aimed at `audience`/`scopes`.
    pub async fn token_exchange(
        &self,
        subject_token: &str,
        audience: Option<&str>,
        scopes: &[String],
    ) -> ProviderResult<Token> {
        self.provider
            .token_exchange(&TokenExchangeRequest {
                client_id: self.client_id.clone(),
                client_secret: self.client_secret.clone(),
                subject_token: subject_token.to_string(),
                audience: audience.map(str::to_string),
                scopes: scopes.to_vec(),
                timeout: self.timeout,
            })
            .await
    }

    /// Wrap a token in a lazy source that refreshes it under the hood.
    pub fn token_source(&self, token: Token) -> TokenSource {
        TokenSource { config: self.clone(), current: token }
    }
}

/// Lazy token source: hands out the held token while it is valid and
/// refreshes it transparently once it is not.
pub struct TokenSource {
    config: ExchangeConfig,
    current: Token,
}

impl TokenSource {
    /// Return a valid token, refreshing first if the held one expired.
    pub async fn token(&mut self) -> ProviderResult<&Token> {
        let now = chrono::Utc::now();
        if !self.current.valid_for(now, chrono::Duration::zero()) && self.current.refreshable() {
            self.current = self.config.refresh(&self.current).await?;
        }
        Ok(&self.current)
    }
}
