//! The provider seam.
//!
//! Every OAuth 2 flavor the engine can be configured with sits behind
//! [`Provider`]. The trait is object-safe so the engine can hold an
//! `Arc<dyn Provider>` built by the registry and dispatch dynamically.
//!
//! Flow inputs arrive as plain request values assembled by the builders in
//! [`crate::builders`]; providers never see persistence or engine state.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::builders::AuthCodeUrlBuilder;
use crate::error::{ProviderError, ProviderResult};
use crate::token::{DeviceAuth, DevicePoll, Token};

/// Authorization-code exchange input (RFC 6749 §4.1.3).
#[derive(Debug, Clone)]
pub struct AuthCodeExchange {
    pub client_id: String,
    pub client_secret: String,
    pub code: String,
    pub redirect_url: Option<String>,
    /// Extra form parameters merged into the token request.
    pub url_params: BTreeMap<String, String>,
    /// Provider-specific options, opaque to callers.
    pub provider_options: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

/// Refresh grant input (RFC 6749 §6).
#[derive(Debug, Clone)]
pub struct RefreshExchange {
    pub client_id: String,
    pub client_secret: String,
    /// The credential being refreshed; must carry a refresh token.
    pub token: Token,
    pub provider_options: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

/// Client-credentials grant input (RFC 6749 §4.4).
#[derive(Debug, Clone)]
pub struct ClientCredentialsExchange {
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub provider_options: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

/// Device authorization request input (RFC 8628 §3.1).
#[derive(Debug, Clone)]
pub struct DeviceAuthRequest {
    pub client_id: String,
    pub scopes: Vec<String>,
    pub provider_options: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

/// Device access token request input (RFC 8628 §3.4).
#[derive(Debug, Clone)]
pub struct DeviceExchangeRequest {
    pub client_id: String,
    pub client_secret: String,
    pub device_code: String,
    pub timeout: Option<Duration>,
}

/// Token exchange input (RFC 8693 §2.1).
#[derive(Debug, Clone)]
pub struct TokenExchangeRequest {
    pub client_id: String,
    pub client_secret: String,
    pub subject_token: String,
    pub audience: Option<String>,
    pub scopes: Vec<String>,
    pub timeout: Option<Duration>,
}

/// A configured OAuth 2 flavor.
///
/// Required capabilities are authorization-code exchange and refresh; the
/// remaining grants default to [`ProviderError::UnsupportedFlow`] so adapters
/// only implement what their server actually offers.
#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// Provider kind, for diagnostics.
    fn name(&self) -> &str;

    /// Version of this provider implementation. Pinned into the config entry
    /// at write time so incompatible upgrades are detected at startup.
    fn version(&self) -> i32;

    /// Start building a browser authorization URL, or `None` when the
    /// provider has no authorization endpoint.
    fn auth_code_url_builder(&self, client_id: &str) -> Option<AuthCodeUrlBuilder>;

    /// Exchange an authorization code for a token.
    async fn exchange(&self, request: &AuthCodeExchange) -> ProviderResult<Token>;

    /// Obtain a fresh token from a refresh token.
    async fn refresh(&self, request: &RefreshExchange) -> ProviderResult<Token>;

    /// Issue a token for the client itself.
    async fn client_credentials(
        &self,
        request: &ClientCredentialsExchange,
    ) -> ProviderResult<Token> {
        let _ = request;
        Err(ProviderError::UnsupportedFlow("client_credentials"))
    }

    /// Begin a device authorization.
    async fn device_auth(&self, request: &DeviceAuthRequest) -> ProviderResult<DeviceAuth> {
        let _ = request;
        Err(ProviderError::UnsupportedFlow("device_authorization"))
    }

    /// Poll a pending device authorization once.
    async fn device_exchange(&self, request: &DeviceExchangeRequest) -> ProviderResult<DevicePoll> {
        let _ = request;
        Err(ProviderError::UnsupportedFlow("device_authorization"))
    }

    /// Exchange one token for another (different audience or scope).
    async fn token_exchange(&self, request: &TokenExchangeRequest) -> ProviderResult<Token> {
        let _ = request;
        Err(ProviderError::UnsupportedFlow("token_exchange"))
    }
}
