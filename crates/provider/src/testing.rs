//! Scriptable mock provider for downstream tests.
//!
//! The mock keeps the registry contract honest (version pinning, option
//! validation) while letting tests script every grant: exchange functions
//! are keyed by client id, refresh replays the original exchange through a
//! refresh-token → code mapping, and device polls pop from a scripted queue.
//!
//! Compiled for this crate's tests and, via the `test-utils` feature, for
//! downstream integration tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use url::Url;

use crate::builders::AuthCodeUrlBuilder;
use crate::error::{ProviderError, ProviderResult, RegistryError};
use crate::registry::{Factory, LATEST_VERSION};
use crate::token::{DeviceAuth, DevicePoll, Token};
use crate::traits::{
    AuthCodeExchange, ClientCredentialsExchange, DeviceAuthRequest, DeviceExchangeRequest,
    Provider, RefreshExchange, TokenExchangeRequest,
};

/// Authorization endpoint baked into the mock provider.
pub const MOCK_AUTH_CODE_URL: &str = "http://localhost/authorize";

/// Exchange function: maps an authorization code to a token outcome.
pub type ExchangeFn = Arc<dyn Fn(&str) -> ProviderResult<Token> + Send + Sync>;

/// Token-exchange function for scripting RFC 8693 behavior.
pub type TokenExchangeFn =
    Arc<dyn Fn(&TokenExchangeRequest) -> ProviderResult<Token> + Send + Sync>;

fn bare_token(access_token: String) -> Token {
    Token {
        access_token,
        token_type: "Bearer".into(),
        refresh_token: None,
        expiry: None,
        extra_data: BTreeMap::new(),
    }
}

/// Exchange that always yields a clone of `token`.
pub fn static_exchange(token: Token) -> ExchangeFn {
    Arc::new(move |_code| Ok(token.clone()))
}

/// Exchange producing `prefix1`, `prefix2`, ... access tokens.
pub fn increment_exchange(prefix: &str) -> ExchangeFn {
    let prefix = prefix.to_string();
    let counter = AtomicU32::new(0);
    Arc::new(move |_code| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(bare_token(format!("{prefix}{n}")))
    })
}

/// Wrap an exchange so every produced token expires `lifetime` from now.
pub fn expiring_exchange(inner: ExchangeFn, lifetime: Duration) -> ExchangeFn {
    amend_exchange(inner, move |token| {
        token.expiry = Some(Utc::now() + lifetime);
        Ok(())
    })
}

/// Wrap an exchange so produced tokens carry a stable refresh token and an
/// expiry chosen per attempt by `step` (attempt numbering starts at 1).
pub fn refreshable_exchange<F>(inner: ExchangeFn, step: F) -> ExchangeFn
where
    F: Fn(u32) -> ProviderResult<Duration> + Send + Sync + 'static,
{
    let refresh_token = format!("refresh-{}", rand_suffix());
    let attempt = AtomicU32::new(0);
    amend_exchange(inner, move |token| {
        let lifetime = step(attempt.fetch_add(1, Ordering::SeqCst) + 1)?;
        token.refresh_token = Some(refresh_token.clone());
        token.expiry = Some(Utc::now() + lifetime);
        Ok(())
    })
}

/// Exchange that always fails with the error produced by `make`.
pub fn error_exchange<F>(make: F) -> ExchangeFn
where
    F: Fn() -> ProviderError + Send + Sync + 'static,
{
    Arc::new(move |_code| Err(make()))
}

fn amend_exchange<F>(inner: ExchangeFn, amend: F) -> ExchangeFn
where
    F: Fn(&mut Token) -> ProviderResult<()> + Send + Sync + 'static,
{
    Arc::new(move |code| {
        let mut token = inner(code)?;
        amend(&mut token)?;
        Ok(token)
    })
}

fn rand_suffix() -> String {
    // Process-unique is all the tests need.
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    format!("{:08x}", COUNTER.fetch_add(1, Ordering::SeqCst))
}

/// Scripted device flow: one authorization, then a queue of poll outcomes.
struct DeviceScript {
    auth: DeviceAuth,
    polls: Mutex<VecDeque<ProviderResult<DevicePoll>>>,
}

/// Shared state behind every instance a mock factory produces.
///
/// Instances share state on purpose: a reconfigure builds a fresh provider
/// and tests still expect refresh-token mappings to survive it.
#[derive(Default)]
struct MockState {
    exchanges: HashMap<String, ExchangeFn>,
    refresh_overrides: HashMap<String, ExchangeFn>,
    token_exchange: Option<TokenExchangeFn>,
    device: Option<DeviceScript>,
    refresh_codes: Mutex<HashMap<String, String>>,
}

impl MockState {
    fn put_refresh_code(&self, refresh_token: &str, code: &str) {
        self.refresh_codes
            .lock()
            .expect("refresh code map poisoned")
            .insert(refresh_token.to_string(), code.to_string());
    }

    fn get_refresh_code(&self, refresh_token: &str) -> Option<String> {
        self.refresh_codes.lock().expect("refresh code map poisoned").get(refresh_token).cloned()
    }
}

/// Builder for a mock provider factory.
pub struct MockFactoryBuilder {
    version: i32,
    expected_options: BTreeMap<String, String>,
    state: MockState,
}

impl Default for MockFactoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFactoryBuilder {
    pub fn new() -> Self {
        Self { version: 1, expected_options: BTreeMap::new(), state: MockState::default() }
    }

    /// Set the version the factory reports and accepts.
    pub fn with_version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    /// Require `key=value` among the provider options.
    pub fn expect_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.expected_options.insert(key.into(), value.into());
        self
    }

    /// Script the exchange (and, through the code mapping, refresh) for a
    /// client id.
    pub fn with_exchange(mut self, client_id: impl Into<String>, exchange: ExchangeFn) -> Self {
        self.state.exchanges.insert(client_id.into(), exchange);
        self
    }

    /// Override refresh for a client id instead of replaying its exchange.
    /// The function receives the stored refresh token as its argument.
    pub fn with_refresh(mut self, client_id: impl Into<String>, refresh: ExchangeFn) -> Self {
        self.state.refresh_overrides.insert(client_id.into(), refresh);
        self
    }

    /// Script RFC 8693 token exchange.
    pub fn with_token_exchange(mut self, exchange: TokenExchangeFn) -> Self {
        self.state.token_exchange = Some(exchange);
        self
    }

    /// Script the device flow: the authorization returned by `device_auth`
    /// and the queue of outcomes successive polls pop from.
    pub fn with_device_script(
        mut self,
        auth: DeviceAuth,
        polls: Vec<ProviderResult<DevicePoll>>,
    ) -> Self {
        self.state.device = Some(DeviceScript { auth, polls: Mutex::new(polls.into()) });
        self
    }

    /// Finalize into a registry factory.
    pub fn into_factory(self) -> Factory {
        let version = self.version;
        let expected = self.expected_options;
        let state = Arc::new(self.state);

        Arc::new(move |requested, options| {
            if requested != LATEST_VERSION && requested != version {
                return Err(RegistryError::NoSuchProviderVersion {
                    name: "mock".to_string(),
                    version: requested,
                });
            }

            for (key, expected_value) in &expected {
                match options.get(key) {
                    None => return Err(RegistryError::option(key, "not found")),
                    Some(actual) if actual != expected_value => {
                        return Err(RegistryError::option(
                            key,
                            format!("expected {expected_value:?}, got {actual:?}"),
                        ));
                    }
                    Some(_) => {}
                }
            }
            for key in options.keys() {
                if !expected.contains_key(key) {
                    return Err(RegistryError::option(key, "unexpected"));
                }
            }

            Ok(Arc::new(MockProvider { version, state: Arc::clone(&state) }) as Arc<dyn Provider>)
        })
    }
}

/// The provider instances a mock factory hands out.
struct MockProvider {
    version: i32,
    state: Arc<MockState>,
}

impl std::fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProvider").field("version", &self.version).finish()
    }
}

impl MockProvider {
    fn exchange_fn(&self, client_id: &str) -> ProviderResult<&ExchangeFn> {
        self.state.exchanges.get(client_id).ok_or_else(|| {
            ProviderError::oauth("invalid_client", Some(format!("unknown client {client_id:?}")))
        })
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn version(&self) -> i32 {
        self.version
    }

    fn auth_code_url_builder(&self, client_id: &str) -> Option<AuthCodeUrlBuilder> {
        let endpoint = Url::parse(MOCK_AUTH_CODE_URL).expect("static mock endpoint parses");
        Some(AuthCodeUrlBuilder::new(endpoint, client_id))
    }

    async fn exchange(&self, request: &AuthCodeExchange) -> ProviderResult<Token> {
        let token = self.exchange_fn(&request.client_id)?(&request.code)?;
        if let Some(refresh_token) = token.refresh_token.as_deref() {
            self.state.put_refresh_code(refresh_token, &request.code);
        }
        Ok(token)
    }

    async fn refresh(&self, request: &RefreshExchange) -> ProviderResult<Token> {
        let refresh_token = request
            .token
            .refresh_token
            .as_deref()
            .ok_or_else(|| ProviderError::Response("token has no refresh token".into()))?;

        if let Some(refresh) = self.state.refresh_overrides.get(&request.client_id) {
            return refresh(refresh_token);
        }

        let code = self.state.get_refresh_code(refresh_token).ok_or_else(|| {
            ProviderError::oauth("invalid_grant", Some("unknown refresh token".into()))
        })?;

        let token = self.exchange_fn(&request.client_id)?(&code)?;
        if let Some(new_refresh) = token.refresh_token.as_deref() {
            self.state.put_refresh_code(new_refresh, &code);
        }
        Ok(token)
    }

    async fn client_credentials(
        &self,
        request: &ClientCredentialsExchange,
    ) -> ProviderResult<Token> {
        // Reuses the exchange script; the "code" is the joined scope list.
        self.exchange_fn(&request.client_id)?(&request.scopes.join(" "))
    }

    async fn device_auth(&self, request: &DeviceAuthRequest) -> ProviderResult<DeviceAuth> {
        let _ = request;
        let script = self
            .state
            .device
            .as_ref()
            .ok_or(ProviderError::UnsupportedFlow("device_authorization"))?;
        Ok(script.auth.clone())
    }

    async fn device_exchange(&self, request: &DeviceExchangeRequest) -> ProviderResult<DevicePoll> {
        let script = self
            .state
            .device
            .as_ref()
            .ok_or(ProviderError::UnsupportedFlow("device_authorization"))?;

        if request.device_code != script.auth.device_code {
            return Err(ProviderError::oauth("invalid_grant", Some("unknown device code".into())));
        }

        script
            .polls
            .lock()
            .expect("device poll queue poisoned")
            .pop_front()
            .unwrap_or(Err(ProviderError::oauth("expired_token", None)))
    }

    async fn token_exchange(&self, request: &TokenExchangeRequest) -> ProviderResult<Token> {
        match &self.state.token_exchange {
            Some(exchange) => exchange(request),
            None => Err(ProviderError::UnsupportedFlow("token_exchange")),
        }
    }
}

/// Helper for tests that only need a mock expiry timestamp.
pub fn expires_in(seconds: i64) -> Option<DateTime<Utc>> {
    Some(Utc::now() + Duration::seconds(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn options(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[tokio::test]
    async fn exchange_then_refresh_replays_the_code() {
        let mut registry = Registry::new();
        registry
            .register(
                "mock",
                MockFactoryBuilder::new()
                    .with_exchange(
                        "foo",
                        refreshable_exchange(increment_exchange("tok"), |_| {
                            Ok(Duration::seconds(1))
                        }),
                    )
                    .into_factory(),
            )
            .unwrap();

        let provider = registry.build("mock", LATEST_VERSION, &BTreeMap::new()).unwrap();
        let token = provider
            .exchange(&AuthCodeExchange {
                client_id: "foo".into(),
                client_secret: "bar".into(),
                code: "123456".into(),
                redirect_url: None,
                url_params: BTreeMap::new(),
                provider_options: BTreeMap::new(),
                timeout: None,
            })
            .await
            .unwrap();
        assert_eq!(token.access_token, "tok1");
        assert!(token.refreshable());

        let refreshed = provider
            .refresh(&RefreshExchange {
                client_id: "foo".into(),
                client_secret: "bar".into(),
                token,
                provider_options: BTreeMap::new(),
                timeout: None,
            })
            .await
            .unwrap();
        assert_eq!(refreshed.access_token, "tok2");
    }

    #[tokio::test]
    async fn factory_validates_version_and_options() {
        let factory = MockFactoryBuilder::new()
            .with_version(2)
            .expect_option("tenant", "acme")
            .into_factory();

        assert!(matches!(
            factory(3, &options(&[("tenant", "acme")])).unwrap_err(),
            RegistryError::NoSuchProviderVersion { version: 3, .. }
        ));
        assert!(matches!(
            factory(2, &options(&[])).unwrap_err(),
            RegistryError::Option { key, .. } if key == "tenant"
        ));
        assert!(matches!(
            factory(2, &options(&[("tenant", "evilcorp")])).unwrap_err(),
            RegistryError::Option { key, .. } if key == "tenant"
        ));
        assert!(matches!(
            factory(2, &options(&[("tenant", "acme"), ("extra", "x")])).unwrap_err(),
            RegistryError::Option { key, .. } if key == "extra"
        ));
        assert!(factory(LATEST_VERSION, &options(&[("tenant", "acme")])).is_ok());
    }

    #[tokio::test]
    async fn device_script_pops_in_order() {
        let auth = DeviceAuth {
            device_code: "dc".into(),
            user_code: "ABCD-EFGH".into(),
            verification_uri: "https://auth.example.com/device".into(),
            verification_uri_complete: None,
            interval: 5,
            expires_at: expires_in(600),
        };
        let factory = MockFactoryBuilder::new()
            .with_device_script(
                auth.clone(),
                vec![Ok(DevicePoll::Pending), Ok(DevicePoll::Granted(bare_token("granted".into())))],
            )
            .into_factory();
        let provider = factory(LATEST_VERSION, &BTreeMap::new()).unwrap();

        let started = provider
            .device_auth(&DeviceAuthRequest {
                client_id: "foo".into(),
                scopes: vec![],
                provider_options: BTreeMap::new(),
                timeout: None,
            })
            .await
            .unwrap();
        assert_eq!(started, auth);

        let request = DeviceExchangeRequest {
            client_id: "foo".into(),
            client_secret: String::new(),
            device_code: "dc".into(),
            timeout: None,
        };
        assert_eq!(provider.device_exchange(&request).await.unwrap(), DevicePoll::Pending);
        assert!(matches!(
            provider.device_exchange(&request).await.unwrap(),
            DevicePoll::Granted(token) if token.access_token == "granted"
        ));
        // Script exhausted: the device code has aged out.
        assert!(provider.device_exchange(&request).await.unwrap_err().is_permanent());
    }
}
