//! OpenID Connect flavored adapter.
//!
//! `oidc` behaves exactly like [`basic`](crate::basic) on the wire, but when
//! a token response carries an `id_token` the JWT payload is decoded (no
//! signature validation; that is the relying party's job) and its claims are
//! lifted into the token's `extra_data` under `"claims"`. Consumers get the
//! subject, email, and friends without re-parsing the JWT themselves.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use tracing::debug;

use crate::basic::{check_version, endpoints_from_options, BasicProvider, Endpoints};
use crate::builders::AuthCodeUrlBuilder;
use crate::error::ProviderResult;
use crate::registry::Factory;
use crate::token::{DeviceAuth, DevicePoll, Token};
use crate::traits::{
    AuthCodeExchange, ClientCredentialsExchange, DeviceAuthRequest, DeviceExchangeRequest,
    Provider, RefreshExchange, TokenExchangeRequest,
};

/// Version reported by this adapter.
pub const VERSION: i32 = crate::basic::VERSION;

const CLAIMS_KEY: &str = "claims";
const ID_TOKEN_KEY: &str = "id_token";

/// OIDC adapter delegating to [`BasicProvider`] and post-processing token
/// responses.
#[derive(Debug)]
pub struct OidcProvider {
    inner: BasicProvider,
}

impl OidcProvider {
    /// Build a provider for the given endpoints.
    pub fn new(endpoints: Endpoints) -> Self {
        Self { inner: BasicProvider::named("oidc", endpoints) }
    }

    fn annotate(mut token: Token) -> Token {
        let Some(id_token) = token.extra_data.get(ID_TOKEN_KEY).and_then(|v| v.as_str()) else {
            return token;
        };

        match decode_jwt_claims(id_token) {
            Some(claims) => {
                token.extra_data.insert(CLAIMS_KEY.to_string(), claims);
            }
            None => debug!("token response carried an undecodable id_token; leaving it as-is"),
        }
        token
    }
}

/// Decode the claims segment of a JWT without verifying its signature.
fn decode_jwt_claims(jwt: &str) -> Option<serde_json::Value> {
    let mut segments = jwt.split('.');
    let _header = segments.next()?;
    let payload = segments.next()?;
    let _signature = segments.next()?;
    if segments.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims.is_object().then_some(claims)
}

#[async_trait]
impl Provider for OidcProvider {
    fn name(&self) -> &str {
        "oidc"
    }

    fn version(&self) -> i32 {
        VERSION
    }

    fn auth_code_url_builder(&self, client_id: &str) -> Option<AuthCodeUrlBuilder> {
        self.inner.auth_code_url_builder(client_id)
    }

    async fn exchange(&self, request: &AuthCodeExchange) -> ProviderResult<Token> {
        self.inner.exchange(request).await.map(Self::annotate)
    }

    async fn refresh(&self, request: &RefreshExchange) -> ProviderResult<Token> {
        self.inner.refresh(request).await.map(Self::annotate)
    }

    async fn client_credentials(
        &self,
        request: &ClientCredentialsExchange,
    ) -> ProviderResult<Token> {
        self.inner.client_credentials(request).await.map(Self::annotate)
    }

    async fn device_auth(&self, request: &DeviceAuthRequest) -> ProviderResult<DeviceAuth> {
        self.inner.device_auth(request).await
    }

    async fn device_exchange(&self, request: &DeviceExchangeRequest) -> ProviderResult<DevicePoll> {
        let poll = self.inner.device_exchange(request).await?;
        Ok(match poll {
            DevicePoll::Granted(token) => DevicePoll::Granted(Self::annotate(token)),
            other => other,
        })
    }

    async fn token_exchange(&self, request: &TokenExchangeRequest) -> ProviderResult<Token> {
        self.inner.token_exchange(request).await
    }
}

/// Factory for the stock `oidc` provider; takes the same endpoint options as
/// `basic`.
pub fn factory() -> Factory {
    Arc::new(|version, options| {
        check_version("oidc", version)?;
        let endpoints = endpoints_from_options(options)?;
        Ok(Arc::new(OidcProvider::new(endpoints)) as Arc<dyn Provider>)
    })
}
