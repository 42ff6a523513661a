//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokensmith_engine::backend::{Backend, ConfigUpdateRequest, CredentialWriteRequest};
use tokensmith_engine::persistence::ConfigTuning;
use tokensmith_engine::testing::MemoryStore;
use tokensmith_engine::Clock;
use tokensmith_provider::testing::{ExchangeFn, MockFactoryBuilder};
use tokensmith_provider::{Registry, Token};

pub const CLIENT_ID: &str = "foo";
pub const CLIENT_SECRET: &str = "bar";

/// Registry containing only the given mock factory under the name `mock`.
pub fn mock_registry(builder: MockFactoryBuilder) -> Arc<Registry> {
    let mut registry = Registry::new();
    registry.register("mock", builder.into_factory()).expect("fresh registry");
    Arc::new(registry)
}

/// Backend on a fresh in-memory store, configured against the mock provider.
pub async fn configured_backend(
    builder: MockFactoryBuilder,
    tuning: ConfigTuning,
    clock: Arc<dyn Clock>,
) -> (Arc<Backend>, Arc<MemoryStore>) {
    let store = MemoryStore::new();
    let backend = Arc::new(Backend::with_clock(
        store.clone() as Arc<dyn tokensmith_engine::Store>,
        mock_registry(builder),
        clock,
    ));

    backend
        .config_update(config_request(tuning))
        .await
        .expect("configuration with the mock provider succeeds");

    (backend, store)
}

/// A `config` update against the mock provider.
pub fn config_request(tuning: ConfigTuning) -> ConfigUpdateRequest {
    ConfigUpdateRequest {
        client_id: CLIENT_ID.to_string(),
        client_secret: CLIENT_SECRET.to_string(),
        provider: "mock".to_string(),
        provider_options: BTreeMap::new(),
        auth_url_params: BTreeMap::new(),
        tuning,
    }
}

/// A `creds/<name>` update performing an authorization-code exchange.
pub fn exchange_request(name: &str, code: &str) -> CredentialWriteRequest {
    CredentialWriteRequest {
        name: name.to_string(),
        code: Some(code.to_string()),
        redirect_url: Some("http://example.com/redirect".to_string()),
        refresh_token: None,
        auth_url_params: BTreeMap::new(),
        provider_options: BTreeMap::new(),
    }
}

/// A bearer token carrying the given refresh token and lifetime.
pub fn token(access: &str, refresh: Option<&str>, lifetime_seconds: i64) -> Token {
    Token {
        access_token: access.to_string(),
        token_type: "Bearer".to_string(),
        refresh_token: refresh.map(str::to_string),
        expiry: (lifetime_seconds != 0)
            .then(|| chrono::Utc::now() + chrono::Duration::seconds(lifetime_seconds)),
        extra_data: BTreeMap::new(),
    }
}

/// Exchange script for the two-step scenario: the code yields `abcd`
/// (refreshable, short-lived), every refresh yields `ijkl` (long-lived).
/// Returns the script plus a counter of provider calls.
pub fn abcd_then_ijkl(initial_lifetime: i64) -> (ExchangeFn, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let exchange: ExchangeFn = Arc::new(move |_code| {
        let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if call == 1 {
            Ok(token("abcd", Some("efgh"), initial_lifetime))
        } else {
            Ok(token("ijkl", Some("efgh"), 3600))
        }
    });
    (exchange, calls)
}
