//! The standard OAuth 2 adapter.
//!
//! `basic` talks plain RFC-conformant OAuth 2 against a configured endpoint
//! set: authorization-code exchange and refresh (RFC 6749), client
//! credentials (RFC 6749 §4.4), device authorization (RFC 8628), and token
//! exchange (RFC 8693). Anything server-specific belongs in a wrapping
//! adapter, not here.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use url::Url;

use crate::builders::AuthCodeUrlBuilder;
use crate::error::{ProviderError, ProviderResult, RegistryError};
use crate::http::{post_form, post_token_request};
use crate::registry::{reject_unknown_options, require_option, Factory, LATEST_VERSION};
use crate::token::{DeviceAuth, DevicePoll, Token};
use crate::traits::{
    AuthCodeExchange, ClientCredentialsExchange, DeviceAuthRequest, DeviceExchangeRequest,
    Provider, RefreshExchange, TokenExchangeRequest,
};

/// Version reported (and pinned into configs) by this adapter.
pub const VERSION: i32 = 1;

const GRANT_TYPE_AUTH_CODE: &str = "authorization_code";
const GRANT_TYPE_REFRESH: &str = "refresh_token";
const GRANT_TYPE_CLIENT_CREDENTIALS: &str = "client_credentials";
const GRANT_TYPE_DEVICE: &str = "urn:ietf:params:oauth:grant-type:device_code";
const GRANT_TYPE_TOKEN_EXCHANGE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const SUBJECT_TOKEN_TYPE_ACCESS: &str = "urn:ietf:params:oauth:token-type:access_token";

/// Default device poll interval when the server does not send one
/// (RFC 8628 §3.2).
const DEFAULT_DEVICE_INTERVAL: u64 = 5;

/// Endpoint set for a [`BasicProvider`].
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Browser authorization endpoint; absent for machine-only deployments.
    pub auth_url: Option<Url>,

    /// Token endpoint, used by every grant.
    pub token_url: Url,

    /// Device authorization endpoint (RFC 8628); absent disables the device
    /// flow.
    pub device_auth_url: Option<Url>,
}

/// Standard OAuth 2 provider over a fixed endpoint set.
#[derive(Debug)]
pub struct BasicProvider {
    name: &'static str,
    endpoints: Endpoints,
    client: reqwest::Client,
}

impl BasicProvider {
    /// Build a provider for the given endpoints.
    pub fn new(endpoints: Endpoints) -> Self {
        Self::named("basic", endpoints)
    }

    pub(crate) fn named(name: &'static str, endpoints: Endpoints) -> Self {
        Self { name, endpoints, client: reqwest::Client::new() }
    }

    pub(crate) fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }
}

#[async_trait]
impl Provider for BasicProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn version(&self) -> i32 {
        VERSION
    }

    fn auth_code_url_builder(&self, client_id: &str) -> Option<AuthCodeUrlBuilder> {
        self.endpoints
            .auth_url
            .as_ref()
            .map(|endpoint| AuthCodeUrlBuilder::new(endpoint.clone(), client_id))
    }

    async fn exchange(&self, request: &AuthCodeExchange) -> ProviderResult<Token> {
        let mut params: Vec<(&str, &str)> = vec![
            ("grant_type", GRANT_TYPE_AUTH_CODE),
            ("client_id", &request.client_id),
            ("code", &request.code),
        ];
        if !request.client_secret.is_empty() {
            params.push(("client_secret", &request.client_secret));
        }
        if let Some(redirect_url) = &request.redirect_url {
            params.push(("redirect_uri", redirect_url));
        }
        for (key, value) in &request.url_params {
            params.push((key, value));
        }

        post_token_request(
            &self.client,
            &self.endpoints.token_url,
            &params,
            request.timeout,
            Utc::now(),
        )
        .await
    }

    async fn refresh(&self, request: &RefreshExchange) -> ProviderResult<Token> {
        let refresh_token = request
            .token
            .refresh_token
            .as_deref()
            .filter(|rt| !rt.is_empty())
            .ok_or_else(|| ProviderError::Response("token has no refresh token".into()))?;

        let mut params: Vec<(&str, &str)> = vec![
            ("grant_type", GRANT_TYPE_REFRESH),
            ("client_id", &request.client_id),
            ("refresh_token", refresh_token),
        ];
        if !request.client_secret.is_empty() {
            params.push(("client_secret", &request.client_secret));
        }

        let mut refreshed = post_token_request(
            &self.client,
            &self.endpoints.token_url,
            &params,
            request.timeout,
            Utc::now(),
        )
        .await?;

        // Servers may omit the refresh token on rotation-free responses;
        // carry the old one forward so the credential stays refreshable.
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = Some(refresh_token.to_string());
        }

        Ok(refreshed)
    }

    async fn client_credentials(
        &self,
        request: &ClientCredentialsExchange,
    ) -> ProviderResult<Token> {
        let scope = request.scopes.join(" ");
        let mut params: Vec<(&str, &str)> = vec![
            ("grant_type", GRANT_TYPE_CLIENT_CREDENTIALS),
            ("client_id", &request.client_id),
        ];
        if !request.client_secret.is_empty() {
            params.push(("client_secret", &request.client_secret));
        }
        if !scope.is_empty() {
            params.push(("scope", &scope));
        }

        post_token_request(
            &self.client,
            &self.endpoints.token_url,
            &params,
            request.timeout,
            Utc::now(),
        )
        .await
    }

    async fn device_auth(&self, request: &DeviceAuthRequest) -> ProviderResult<DeviceAuth> {
        let endpoint = self
            .endpoints
            .device_auth_url
            .as_ref()
            .ok_or(ProviderError::UnsupportedFlow("device_authorization"))?;

        let scope = request.scopes.join(" ");
        let mut params: Vec<(&str, &str)> = vec![("client_id", &request.client_id)];
        if !scope.is_empty() {
            params.push(("scope", &scope));
        }

        let body = post_form(&self.client, endpoint, &params, request.timeout).await?;
        let raw: RawDeviceAuthResponse = serde_json::from_slice(&body).map_err(|err| {
            ProviderError::Response(format!("invalid device authorization response: {err}"))
        })?;

        Ok(DeviceAuth {
            device_code: raw.device_code,
            user_code: raw.user_code,
            verification_uri: raw.verification_uri,
            verification_uri_complete: raw.verification_uri_complete,
            interval: raw.interval.unwrap_or(DEFAULT_DEVICE_INTERVAL),
            expires_at: raw
                .expires_in
                .filter(|&seconds| seconds > 0)
                .map(|seconds| Utc::now() + ChronoDuration::seconds(seconds)),
        })
    }

    async fn device_exchange(&self, request: &DeviceExchangeRequest) -> ProviderResult<DevicePoll> {
        let mut params: Vec<(&str, &str)> = vec![
            ("grant_type", GRANT_TYPE_DEVICE),
            ("client_id", &request.client_id),
            ("device_code", &request.device_code),
        ];
        if !request.client_secret.is_empty() {
            params.push(("client_secret", &request.client_secret));
        }

        let result = post_token_request(
            &self.client,
            &self.endpoints.token_url,
            &params,
            request.timeout,
            Utc::now(),
        )
        .await;

        match result {
            Ok(token) => Ok(DevicePoll::Granted(token)),
            Err(err) if err.oauth_code() == Some("authorization_pending") => {
                Ok(DevicePoll::Pending)
            }
            Err(err) if err.oauth_code() == Some("slow_down") => Ok(DevicePoll::SlowDown),
            Err(err) => Err(err),
        }
    }

    async fn token_exchange(&self, request: &TokenExchangeRequest) -> ProviderResult<Token> {
        let scope = request.scopes.join(" ");
        let mut params: Vec<(&str, &str)> = vec![
            ("grant_type", GRANT_TYPE_TOKEN_EXCHANGE),
            ("client_id", &request.client_id),
            ("subject_token", &request.subject_token),
            ("subject_token_type", SUBJECT_TOKEN_TYPE_ACCESS),
        ];
        if !request.client_secret.is_empty() {
            params.push(("client_secret", &request.client_secret));
        }
        if let Some(audience) = &request.audience {
            params.push(("audience", audience));
        }
        if !scope.is_empty() {
            params.push(("scope", &scope));
        }

        post_token_request(
            &self.client,
            &self.endpoints.token_url,
            &params,
            request.timeout,
            Utc::now(),
        )
        .await
    }
}

/// Wire form of a device authorization response (RFC 8628 §3.2).
#[derive(Debug, Deserialize)]
struct RawDeviceAuthResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    #[serde(default)]
    verification_uri_complete: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    interval: Option<u64>,
}

const OPTION_AUTH_URL: &str = "auth_url";
const OPTION_TOKEN_URL: &str = "token_url";
const OPTION_DEVICE_AUTH_URL: &str = "device_auth_url";

/// Factory for the stock `basic` provider: endpoints arrive as provider
/// options (`token_url` required, `auth_url`/`device_auth_url` optional).
pub fn factory() -> Factory {
    Arc::new(|version, options| {
        check_version("basic", version)?;
        let endpoints = endpoints_from_options(options)?;
        Ok(Arc::new(BasicProvider::new(endpoints)) as Arc<dyn Provider>)
    })
}

/// Factory for a `basic` provider with endpoints fixed at registration time;
/// such providers accept no options at all.
pub fn factory_with_endpoints(endpoints: Endpoints) -> Factory {
    Arc::new(move |version, options| {
        check_version("basic", version)?;
        reject_unknown_options(options, &[])?;
        Ok(Arc::new(BasicProvider::new(endpoints.clone())) as Arc<dyn Provider>)
    })
}

pub(crate) fn check_version(name: &str, version: i32) -> Result<(), RegistryError> {
    if version == LATEST_VERSION || version == VERSION {
        Ok(())
    } else {
        Err(RegistryError::NoSuchProviderVersion { name: name.to_string(), version })
    }
}

pub(crate) fn endpoints_from_options(
    options: &BTreeMap<String, String>,
) -> Result<Endpoints, RegistryError> {
    reject_unknown_options(options, &[OPTION_AUTH_URL, OPTION_TOKEN_URL, OPTION_DEVICE_AUTH_URL])?;

    let token_url = parse_url_option(OPTION_TOKEN_URL, require_option(options, OPTION_TOKEN_URL)?)?;
    let auth_url = match options.get(OPTION_AUTH_URL) {
        Some(value) => Some(parse_url_option(OPTION_AUTH_URL, value)?),
        None => None,
    };
    let device_auth_url = match options.get(OPTION_DEVICE_AUTH_URL) {
        Some(value) => Some(parse_url_option(OPTION_DEVICE_AUTH_URL, value)?),
        None => None,
    };

    Ok(Endpoints { auth_url, token_url, device_auth_url })
}

fn parse_url_option(key: &str, value: &str) -> Result<Url, RegistryError> {
    Url::parse(value).map_err(|err| RegistryError::option(key, format!("invalid URL: {err}")))
}

#[cfg(test)]
mod tests {
    //! Unit tests for factory validation and URL building; the network paths
    //! are covered by the wiremock integration tests.
    use super::*;

    fn options(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn factory_requires_token_url() {
        let err = factory()(LATEST_VERSION, &options(&[])).unwrap_err();
        assert!(matches!(err, RegistryError::Option { key, .. } if key == "token_url"));
    }

    #[test]
    fn factory_rejects_unknown_options() {
        let opts =
            options(&[("token_url", "https://auth.example.com/token"), ("pixie_dust", "yes")]);
        let err = factory()(LATEST_VERSION, &opts).unwrap_err();
        assert!(matches!(err, RegistryError::Option { key, .. } if key == "pixie_dust"));
    }

    #[test]
    fn factory_rejects_malformed_urls() {
        let opts = options(&[("token_url", "not a url")]);
        let err = factory()(LATEST_VERSION, &opts).unwrap_err();
        assert!(matches!(err, RegistryError::Option { key, .. } if key == "token_url"));
    }

    #[test]
    fn factory_rejects_unsupported_versions() {
        let opts = options(&[("token_url", "https://auth.example.com/token")]);
        assert!(factory()(VERSION, &opts).is_ok());
        assert!(factory()(LATEST_VERSION, &opts).is_ok());

        let err = factory()(99, &opts).unwrap_err();
        assert!(matches!(err, RegistryError::NoSuchProviderVersion { version: 99, .. }));
    }

    #[test]
    fn auth_code_url_builder_requires_auth_endpoint() {
        let provider = BasicProvider::new(Endpoints {
            auth_url: None,
            token_url: Url::parse("https://auth.example.com/token").unwrap(),
            device_auth_url: None,
        });
        assert!(provider.auth_code_url_builder("foo").is_none());

        let provider = BasicProvider::new(Endpoints {
            auth_url: Some(Url::parse("https://auth.example.com/authorize").unwrap()),
            token_url: Url::parse("https://auth.example.com/token").unwrap(),
            device_auth_url: None,
        });
        assert!(provider.auth_code_url_builder("foo").is_some());
    }
}
