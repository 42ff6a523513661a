//! Credential manager: per-credential CRUD, exchange, and refresh.
//!
//! Everything that touches `creds/<name>` goes through here, interactive
//! operations and background sweeps alike. Each operation acquires the
//! entry's lock for its whole read-modify-write cycle, so a reader that
//! triggers a refresh observes either the value it wrote or the prior value,
//! never a partial update. No lock is held across more than one HTTP
//! round-trip.
//!
//! Interactive refresh failures are deliberately not written into
//! `auth_server_error`: the background refresher owns those counters, and
//! mixing interactive traffic in would distort both the retry backoff and
//! the transient-reap criterion.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokensmith_provider::{ExchangeBuilder, ExchangeConfig, ProviderError, Token};
use tracing::{info, warn};

use crate::cache::Bundle;
use crate::clock::Clock;
use crate::error::{EngineError, EngineResult};
use crate::locking::LockTable;
use crate::persistence::{keys, ConfigTuning, CredentialEntry};
use crate::store::Store;

/// Cap on the failure backoff between background refresh attempts.
const MAX_RETRY_BACKOFF_SECONDS: i64 = 300;

/// Result of an interactive read.
pub struct ReadOutcome {
    pub entry: CredentialEntry,
    /// Set when a refresh was due but failed transiently and the stale
    /// token was returned instead.
    pub refresh_warning: Option<String>,
}

/// What a background refresh pass did with one credential.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RefreshOutcome {
    Missing,
    NotRefreshable,
    PermanentlyFailed,
    BackingOff,
    NotDue,
    Refreshed,
    Failed(String),
}

/// Why a credential was (or would be) reaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapCriterion {
    /// Expired with no refresh token to revive it.
    NonRefreshable,
    /// Expired and the authorization server revoked its grant.
    Revoked,
    /// Expired and stuck behind repeated transient refresh failures.
    TransientStuck,
}

impl ReapCriterion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NonRefreshable => "non_refreshable",
            Self::Revoked => "revoked",
            Self::TransientStuck => "transient_stuck",
        }
    }
}

/// What a reap pass did with one credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReapOutcome {
    Kept,
    /// Dry run: the credential matched a criterion but was left in place.
    WouldReap(ReapCriterion),
    Reaped(ReapCriterion),
}

/// Manager for `creds/<name>` entries.
pub struct CredentialManager {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    locks: Arc<LockTable>,
}

impl CredentialManager {
    pub(crate) fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        locks: Arc<LockTable>,
    ) -> Self {
        Self { store, clock, locks }
    }

    /// Exchange an authorization code and persist the resulting credential.
    pub(crate) async fn write_exchanged(
        &self,
        bundle: &Bundle,
        name: &str,
        code: &str,
        redirect_url: Option<&str>,
        auth_url_params: &BTreeMap<String, String>,
        provider_options: &BTreeMap<String, String>,
    ) -> EngineResult<CredentialEntry> {
        let key = keys::credential(name);
        let _lock = self.locks.acquire(&key).await;

        let mut builder = self
            .exchange_builder(bundle, false)
            .with_url_params(auth_url_params.clone())
            .with_provider_options(provider_options.clone());
        if let Some(redirect_url) = redirect_url {
            builder = builder.with_redirect_url(redirect_url);
        }

        let token = builder.build().exchange(code).await?;
        let entry = CredentialEntry::issued(token, self.clock.now());
        self.store.put(&key, entry.encode()?).await?;
        info!(credential = name, "credential stored from authorization code exchange");
        Ok(entry)
    }

    /// Persist a credential seeded from a bare refresh token; the first read
    /// will refresh it into a usable token.
    pub(crate) async fn seed(&self, name: &str, refresh_token: &str) -> EngineResult<CredentialEntry> {
        let key = keys::credential(name);
        let _lock = self.locks.acquire(&key).await;

        let entry = CredentialEntry::seeded(refresh_token.to_string(), self.clock.now());
        self.store.put(&key, entry.encode()?).await?;
        info!(credential = name, "credential seeded from refresh token");
        Ok(entry)
    }

    /// Store a token issued outside the exchange path (device grant).
    pub(crate) async fn put_issued(&self, name: &str, token: Token) -> EngineResult<CredentialEntry> {
        let key = keys::credential(name);
        let _lock = self.locks.acquire(&key).await;

        let entry = CredentialEntry::issued(token, self.clock.now());
        self.store.put(&key, entry.encode()?).await?;
        Ok(entry)
    }

    /// Load an entry without touching it.
    pub(crate) async fn get(&self, name: &str) -> EngineResult<Option<CredentialEntry>> {
        let key = keys::credential(name);
        let _lock = self.locks.acquire(&key).await;
        self.load(&key).await
    }

    /// Read the credential, refreshing synchronously when the stored token
    /// cannot satisfy the requested validity window.
    ///
    /// `minimum_seconds` demands the returned token stay valid at least that
    /// long; without it, the stored token is served until it actually
    /// expires. On a transient refresh failure the stale token is returned
    /// with the error annotated — unless a minimum was requested or there is
    /// no usable stale token, in which case the failure propagates.
    pub(crate) async fn read(
        &self,
        bundle: &Bundle,
        name: &str,
        minimum_seconds: Option<u64>,
    ) -> EngineResult<Option<ReadOutcome>> {
        let key = keys::credential(name);
        let _lock = self.locks.acquire(&key).await;

        let Some(mut entry) = self.load(&key).await? else {
            return Ok(None);
        };
        let now = self.clock.now();

        if let Some(failure) = entry.auth_server_error.as_ref().filter(|f| f.permanent) {
            return Err(EngineError::Provider(ProviderError::oauth(
                failure.code.clone(),
                failure.description.clone(),
            )));
        }

        let window = Duration::seconds(minimum_seconds.unwrap_or(0) as i64);
        if entry.token.valid_for(now, window) {
            return Ok(Some(ReadOutcome { entry, refresh_warning: None }));
        }

        if !entry.token.refreshable() {
            return Err(EngineError::user(format!(
                "credential {name:?} has expired and has no refresh token"
            )));
        }

        let expired = entry.token.expired(now) || entry.token.access_token.is_empty();
        let config = self.exchange_builder(bundle, expired).build();

        match config.refresh(&entry.token).await {
            Ok(token) => {
                entry.record_refresh_success(token, now);
                self.store.put(&key, entry.encode()?).await?;
                Ok(Some(ReadOutcome { entry, refresh_warning: None }))
            }
            Err(err) if err.is_permanent() => {
                entry.record_refresh_failure(&err, now);
                self.store.put(&key, entry.encode()?).await?;
                Err(err.into())
            }
            Err(err) => {
                let stale_is_usable = minimum_seconds.is_none()
                    && !entry.token.access_token.is_empty();
                if stale_is_usable {
                    warn!(credential = name, error = %err, "refresh failed; serving stale token");
                    Ok(Some(ReadOutcome { entry, refresh_warning: Some(err.to_string()) }))
                } else {
                    Err(err.into())
                }
            }
        }
    }

    /// Delete the credential; returns whether it existed.
    pub(crate) async fn delete(&self, name: &str) -> EngineResult<bool> {
        let key = keys::credential(name);
        let _lock = self.locks.acquire(&key).await;

        let existed = self.store.get(&key).await?.is_some();
        if existed {
            self.store.delete(&key).await?;
        }
        Ok(existed)
    }

    /// Names of all stored credentials.
    pub(crate) async fn list(&self) -> EngineResult<Vec<String>> {
        Ok(self.store.list(keys::CREDS_PREFIX).await?)
    }

    /// One background refresh pass over a single credential.
    ///
    /// `window` is how far ahead of expiry the sweep refreshes (the check
    /// interval scaled by the expiry delta factor). Failures are recorded on
    /// the entry and reported, never raised, so a bad credential cannot
    /// abort a sweep.
    pub(crate) async fn refresh_due(
        &self,
        bundle: &Bundle,
        name: &str,
        window: Duration,
    ) -> EngineResult<RefreshOutcome> {
        let key = keys::credential(name);
        let _lock = self.locks.acquire(&key).await;

        let Some(mut entry) = self.load(&key).await? else {
            return Ok(RefreshOutcome::Missing);
        };
        if !entry.token.refreshable() {
            return Ok(RefreshOutcome::NotRefreshable);
        }
        if entry.permanently_failed() {
            return Ok(RefreshOutcome::PermanentlyFailed);
        }

        let now = self.clock.now();
        match entry.token.expiry {
            None => return Ok(RefreshOutcome::NotDue),
            Some(expiry) if now + window < expiry => return Ok(RefreshOutcome::NotDue),
            Some(_) => {}
        }

        if let Some(failure) = &entry.auth_server_error {
            if now < failure.last_attempt_at + retry_backoff(failure.attempt_count) {
                return Ok(RefreshOutcome::BackingOff);
            }
        }

        let expired = entry.token.expired(now);
        let config = self.exchange_builder(bundle, expired).build();

        match config.refresh(&entry.token).await {
            Ok(token) => {
                entry.record_refresh_success(token, now);
                self.store.put(&key, entry.encode()?).await?;
                Ok(RefreshOutcome::Refreshed)
            }
            Err(err) => {
                let message = err.to_string();
                entry.record_refresh_failure(&err, now);
                self.store.put(&key, entry.encode()?).await?;
                Ok(RefreshOutcome::Failed(message))
            }
        }
    }

    /// One reap pass over a single credential.
    pub(crate) async fn reap_one(
        &self,
        tuning: &ConfigTuning,
        name: &str,
    ) -> EngineResult<ReapOutcome> {
        let key = keys::credential(name);
        let _lock = self.locks.acquire(&key).await;

        let Some(entry) = self.load(&key).await? else {
            return Ok(ReapOutcome::Kept);
        };

        let Some(criterion) = reap_criterion(&entry, tuning, self.clock.now()) else {
            return Ok(ReapOutcome::Kept);
        };

        if tuning.reap_dry_run {
            info!(
                credential = name,
                criterion = criterion.as_str(),
                "dry run: credential is eligible for reaping"
            );
            return Ok(ReapOutcome::WouldReap(criterion));
        }

        self.store.delete(&key).await?;
        info!(credential = name, criterion = criterion.as_str(), "reaped expired credential");
        Ok(ReapOutcome::Reaped(criterion))
    }

    async fn load(&self, key: &str) -> EngineResult<Option<CredentialEntry>> {
        match self.store.get(key).await? {
            Some(bytes) => Ok(Some(CredentialEntry::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Exchange builder preloaded with the configured client and timeout.
    /// `expired` selects the timeout leeway for already-lapsed tokens.
    fn exchange_builder(&self, bundle: &Bundle, expired: bool) -> ExchangeBuilder {
        let config = &bundle.config;
        ExchangeBuilder::new(Arc::clone(&bundle.provider), &config.client_id, &config.client_secret)
            .with_provider_options(config.provider_options.clone())
            .with_timeout(config.tuning.provider_timeout(expired))
    }

    /// Exchange config for operations outside this manager (token exchange,
    /// client credentials).
    pub(crate) fn exchange_config(&self, bundle: &Bundle, expired: bool) -> ExchangeConfig {
        self.exchange_builder(bundle, expired).build()
    }
}

/// Backoff between background refresh attempts for a failing credential:
/// doubles from one second per recorded attempt, capped at five minutes.
fn retry_backoff(attempt_count: u32) -> Duration {
    let exponent = attempt_count.saturating_sub(1).min(8);
    Duration::seconds((1i64 << exponent).min(MAX_RETRY_BACKOFF_SECONDS))
}

/// Decide whether an entry is reapable, and under which criterion.
///
/// A credential must have passed its expiry; entries without an expiry are
/// never reaped. Each criterion is individually disabled by a zero setting.
pub(crate) fn reap_criterion(
    entry: &CredentialEntry,
    tuning: &ConfigTuning,
    now: DateTime<Utc>,
) -> Option<ReapCriterion> {
    let expiry = entry.token.expiry?;
    if now < expiry {
        return None;
    }
    let past_expiry = now - expiry;

    if !entry.token.refreshable()
        && tuning.reap_non_refreshable_seconds > 0
        && past_expiry >= Duration::seconds(tuning.reap_non_refreshable_seconds as i64)
    {
        return Some(ReapCriterion::NonRefreshable);
    }

    if let Some(failure) = &entry.auth_server_error {
        if failure.permanent
            && tuning.reap_revoked_seconds > 0
            && past_expiry >= Duration::seconds(tuning.reap_revoked_seconds as i64)
        {
            return Some(ReapCriterion::Revoked);
        }

        if !failure.permanent
            && tuning.reap_transient_error_attempts > 0
            && tuning.reap_transient_error_seconds > 0
            && failure.attempt_count >= tuning.reap_transient_error_attempts
            && past_expiry >= Duration::seconds(tuning.reap_transient_error_seconds as i64)
        {
            return Some(ReapCriterion::TransientStuck);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::AuthServerError;

    fn base_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn expired_entry(refreshable: bool) -> CredentialEntry {
        let token = Token {
            access_token: "stale".into(),
            token_type: "Bearer".into(),
            refresh_token: refreshable.then(|| "rt".to_string()),
            expiry: Some(base_time()),
            extra_data: Default::default(),
        };
        CredentialEntry::issued(token, base_time())
    }

    fn failure(permanent: bool, attempt_count: u32) -> AuthServerError {
        AuthServerError {
            code: if permanent { "invalid_grant".into() } else { "server_error".into() },
            description: None,
            permanent,
            last_attempt_at: base_time(),
            attempt_count,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(retry_backoff(1), Duration::seconds(1));
        assert_eq!(retry_backoff(2), Duration::seconds(2));
        assert_eq!(retry_backoff(5), Duration::seconds(16));
        assert_eq!(retry_backoff(9), Duration::seconds(256));
        assert_eq!(retry_backoff(50), Duration::seconds(256));
    }

    #[test]
    fn unexpired_entries_are_never_reapable() {
        let tuning = ConfigTuning {
            reap_non_refreshable_seconds: 1,
            reap_revoked_seconds: 1,
            ..ConfigTuning::default()
        };
        let entry = expired_entry(false);
        // One second before expiry.
        assert_eq!(reap_criterion(&entry, &tuning, base_time() - Duration::seconds(1)), None);
    }

    #[test]
    fn entries_without_expiry_are_never_reapable() {
        let tuning = ConfigTuning { reap_non_refreshable_seconds: 1, ..ConfigTuning::default() };
        let mut entry = expired_entry(false);
        entry.token.expiry = None;
        assert_eq!(reap_criterion(&entry, &tuning, base_time() + Duration::days(365)), None);
    }

    #[test]
    fn non_refreshable_criterion_waits_out_the_grace() {
        let tuning = ConfigTuning { reap_non_refreshable_seconds: 60, ..ConfigTuning::default() };
        let entry = expired_entry(false);

        assert_eq!(reap_criterion(&entry, &tuning, base_time() + Duration::seconds(59)), None);
        assert_eq!(
            reap_criterion(&entry, &tuning, base_time() + Duration::seconds(60)),
            Some(ReapCriterion::NonRefreshable)
        );

        let disabled = ConfigTuning { reap_non_refreshable_seconds: 0, ..ConfigTuning::default() };
        assert_eq!(reap_criterion(&entry, &disabled, base_time() + Duration::days(30)), None);
    }

    #[test]
    fn revoked_criterion_requires_a_permanent_failure() {
        let tuning = ConfigTuning { reap_revoked_seconds: 1, ..ConfigTuning::default() };

        let mut entry = expired_entry(true);
        entry.auth_server_error = Some(failure(true, 1));
        assert_eq!(
            reap_criterion(&entry, &tuning, base_time() + Duration::seconds(2)),
            Some(ReapCriterion::Revoked)
        );

        entry.auth_server_error = Some(failure(false, 1));
        assert_eq!(reap_criterion(&entry, &tuning, base_time() + Duration::seconds(2)), None);
    }

    #[test]
    fn transient_criterion_requires_both_settings_and_enough_attempts() {
        let tuning = ConfigTuning {
            reap_transient_error_attempts: 3,
            reap_transient_error_seconds: 10,
            // Keep the other criteria out of the way.
            reap_non_refreshable_seconds: 0,
            reap_revoked_seconds: 0,
            ..ConfigTuning::default()
        };

        let mut entry = expired_entry(true);
        entry.auth_server_error = Some(failure(false, 4));

        assert_eq!(reap_criterion(&entry, &tuning, base_time() + Duration::seconds(9)), None);
        assert_eq!(
            reap_criterion(&entry, &tuning, base_time() + Duration::seconds(10)),
            Some(ReapCriterion::TransientStuck)
        );

        entry.auth_server_error = Some(failure(false, 2));
        assert_eq!(reap_criterion(&entry, &tuning, base_time() + Duration::seconds(30)), None);

        // Either setting at zero disables the criterion entirely.
        entry.auth_server_error = Some(failure(false, 10));
        let no_attempts = ConfigTuning { reap_transient_error_attempts: 0, ..tuning.clone() };
        assert_eq!(reap_criterion(&entry, &no_attempts, base_time() + Duration::days(1)), None);
        let no_grace = ConfigTuning { reap_transient_error_seconds: 0, ..tuning };
        assert_eq!(reap_criterion(&entry, &no_grace, base_time() + Duration::days(1)), None);
    }
}

#[cfg(test)]
mod background_tests {
    //! Sweep semantics driven directly against the manager with a mock
    //! clock, so no test ever sleeps.
    use std::sync::Arc;

    use tokensmith_provider::testing::{
        error_exchange, expiring_exchange, static_exchange, MockFactoryBuilder,
    };
    use tokensmith_provider::{Registry, LATEST_VERSION};

    use super::*;
    use crate::clock::MockClock;
    use crate::persistence::CONFIG_VERSION_LATEST;
    use crate::testing::MemoryStore;

    struct Harness {
        manager: CredentialManager,
        bundle: Bundle,
        clock: Arc<MockClock>,
        store: Arc<MemoryStore>,
    }

    fn harness(factory_builder: MockFactoryBuilder, tuning: ConfigTuning) -> Harness {
        let mut registry = Registry::new();
        registry.register("mock", factory_builder.into_factory()).unwrap();
        let provider = registry.build("mock", LATEST_VERSION, &BTreeMap::new()).unwrap();

        let config = crate::persistence::ConfigEntry {
            version: CONFIG_VERSION_LATEST,
            client_id: "foo".into(),
            client_secret: "bar".into(),
            auth_url_params: BTreeMap::new(),
            provider_name: "mock".into(),
            provider_version: provider.version(),
            provider_options: BTreeMap::new(),
            tuning,
        };

        let store = MemoryStore::new();
        let clock = Arc::new(MockClock::new());
        let manager = CredentialManager::new(
            store.clone() as Arc<dyn Store>,
            clock.clone() as Arc<dyn Clock>,
            LockTable::new(),
        );
        Harness { manager, bundle: Bundle { config, provider }, clock, store }
    }

    fn seeded_token(lifetime_seconds: i64) -> Token {
        Token {
            access_token: "initial".into(),
            token_type: "Bearer".into(),
            refresh_token: Some("rt".into()),
            expiry: Some(Utc::now() + Duration::seconds(lifetime_seconds)),
            extra_data: Default::default(),
        }
    }

    async fn put_entry(store: &MemoryStore, name: &str, entry: &CredentialEntry) {
        store.put_raw(&keys::credential(name), entry.encode().unwrap()).await;
    }

    async fn get_entry(store: &MemoryStore, name: &str) -> Option<CredentialEntry> {
        let bytes = store.raw(&keys::credential(name)).await?;
        Some(CredentialEntry::decode(&bytes).unwrap())
    }

    #[tokio::test]
    async fn refresh_due_skips_tokens_outside_the_window() {
        let factory = MockFactoryBuilder::new()
            .with_exchange("foo", expiring_exchange(static_exchange(seeded_token(0)), Duration::hours(1)));
        let h = harness(factory, ConfigTuning::default());

        let entry = CredentialEntry::issued(seeded_token(3600), h.clock.now());
        put_entry(&h.store, "alice", &entry).await;

        let outcome =
            h.manager.refresh_due(&h.bundle, "alice", Duration::seconds(60)).await.unwrap();
        assert_eq!(outcome, RefreshOutcome::NotDue);
    }

    #[tokio::test]
    async fn refresh_due_renews_tokens_inside_the_window() {
        let fresh = Token { access_token: "renewed".into(), ..seeded_token(3600) };
        let factory = MockFactoryBuilder::new().with_refresh("foo", static_exchange(fresh));
        let h = harness(factory, ConfigTuning::default());

        let entry = CredentialEntry::issued(seeded_token(30), h.clock.now());
        put_entry(&h.store, "alice", &entry).await;

        let outcome =
            h.manager.refresh_due(&h.bundle, "alice", Duration::seconds(60)).await.unwrap();
        assert_eq!(outcome, RefreshOutcome::Refreshed);

        let stored = get_entry(&h.store, "alice").await.unwrap();
        assert_eq!(stored.token.access_token, "renewed");
        assert!(stored.last_refresh_at.is_some());
        assert!(stored.auth_server_error.is_none());
    }

    #[tokio::test]
    async fn permanent_failure_stops_future_refresh_attempts() {
        let factory = MockFactoryBuilder::new().with_refresh(
            "foo",
            error_exchange(|| ProviderError::oauth("invalid_grant", None)),
        );
        let h = harness(factory, ConfigTuning::default());

        let entry = CredentialEntry::issued(seeded_token(-5), h.clock.now());
        put_entry(&h.store, "alice", &entry).await;

        let window = Duration::seconds(60);
        assert!(matches!(
            h.manager.refresh_due(&h.bundle, "alice", window).await.unwrap(),
            RefreshOutcome::Failed(_)
        ));

        let stored = get_entry(&h.store, "alice").await.unwrap();
        assert!(stored.permanently_failed());
        assert!(stored.token.access_token.is_empty());

        // Marked permanent: later sweeps never reach the network again.
        h.clock.advance(Duration::hours(1));
        assert_eq!(
            h.manager.refresh_due(&h.bundle, "alice", window).await.unwrap(),
            RefreshOutcome::PermanentlyFailed
        );
    }

    #[tokio::test]
    async fn transient_failures_back_off_between_attempts() {
        let factory = MockFactoryBuilder::new()
            .with_refresh("foo", error_exchange(|| ProviderError::Server { status: 503 }));
        let h = harness(factory, ConfigTuning::default());

        let entry = CredentialEntry::issued(seeded_token(-1), h.clock.now());
        put_entry(&h.store, "alice", &entry).await;

        let window = Duration::seconds(60);
        assert!(matches!(
            h.manager.refresh_due(&h.bundle, "alice", window).await.unwrap(),
            RefreshOutcome::Failed(_)
        ));
        // Immediately after a failure the credential is in its backoff
        // window and is skipped.
        assert_eq!(
            h.manager.refresh_due(&h.bundle, "alice", window).await.unwrap(),
            RefreshOutcome::BackingOff
        );

        h.clock.advance(Duration::seconds(2));
        assert!(matches!(
            h.manager.refresh_due(&h.bundle, "alice", window).await.unwrap(),
            RefreshOutcome::Failed(_)
        ));
        assert_eq!(get_entry(&h.store, "alice").await.unwrap().auth_server_error.unwrap().attempt_count, 2);
    }

    #[tokio::test]
    async fn transient_stuck_credentials_are_reaped_after_enough_attempts() {
        let tuning = ConfigTuning {
            reap_transient_error_attempts: 3,
            reap_transient_error_seconds: 10,
            reap_non_refreshable_seconds: 0,
            reap_revoked_seconds: 0,
            ..ConfigTuning::default()
        };
        let factory = MockFactoryBuilder::new()
            .with_refresh("foo", error_exchange(|| ProviderError::Server { status: 502 }));
        let h = harness(factory, tuning.clone());

        // Expires five seconds in; the sweep window makes it due right away.
        let entry = CredentialEntry::issued(seeded_token(5), h.clock.now());
        put_entry(&h.store, "alice", &entry).await;

        // Four failing attempts, advancing past the growing backoff.
        let window = Duration::seconds(60);
        for advance_seconds in [0, 2, 3, 5] {
            h.clock.advance(Duration::seconds(advance_seconds));
            assert!(matches!(
                h.manager.refresh_due(&h.bundle, "alice", window).await.unwrap(),
                RefreshOutcome::Failed(_)
            ));
        }
        assert_eq!(
            get_entry(&h.store, "alice").await.unwrap().auth_server_error.unwrap().attempt_count,
            4
        );

        // Not yet ten seconds past expiry at the first check.
        h.clock.advance(Duration::seconds(1));
        assert_eq!(h.manager.reap_one(&tuning, "alice").await.unwrap(), ReapOutcome::Kept);

        h.clock.advance(Duration::seconds(10));
        assert_eq!(
            h.manager.reap_one(&tuning, "alice").await.unwrap(),
            ReapOutcome::Reaped(ReapCriterion::TransientStuck)
        );
        assert!(get_entry(&h.store, "alice").await.is_none());
    }

    #[tokio::test]
    async fn dry_run_reports_without_deleting() {
        let tuning = ConfigTuning {
            reap_dry_run: true,
            reap_non_refreshable_seconds: 1,
            ..ConfigTuning::default()
        };
        let h = harness(MockFactoryBuilder::new(), tuning.clone());

        let mut token = seeded_token(-5);
        token.refresh_token = None;
        put_entry(&h.store, "alice", &CredentialEntry::issued(token, h.clock.now())).await;

        h.clock.advance(Duration::seconds(10));
        assert_eq!(
            h.manager.reap_one(&tuning, "alice").await.unwrap(),
            ReapOutcome::WouldReap(ReapCriterion::NonRefreshable)
        );
        assert!(get_entry(&h.store, "alice").await.is_some());
    }
}
