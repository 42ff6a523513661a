//! Caller-managed credential entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokensmith_provider::{ProviderError, Token};

use super::{read_version, PersistenceError, PersistenceResult};

/// Current credential schema generation.
pub const CREDENTIAL_VERSION_LATEST: u32 = 2;

const KIND: &str = "credential";

/// One managed credential, keyed by an opaque caller-chosen name.
///
/// An entry either carries a refresh token (refreshable) or not (one-shot).
/// `auth_server_error` captures the most recent *background* refresh
/// failure; its attempt count is monotone across failures and resets to
/// nothing on any success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialEntry {
    pub version: u32,
    pub token: Token,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_server_error: Option<AuthServerError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refresh_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_issued_at: Option<DateTime<Utc>>,
}

/// Record of the most recent failed refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthServerError {
    /// OAuth error code, or a transport classification like `server_error`.
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the failure disqualifies the credential from further refresh.
    pub permanent: bool,
    pub last_attempt_at: DateTime<Utc>,
    pub attempt_count: u32,
}

impl CredentialEntry {
    /// Entry for a freshly exchanged token.
    pub fn issued(token: Token, now: DateTime<Utc>) -> Self {
        Self {
            version: CREDENTIAL_VERSION_LATEST,
            token,
            auth_server_error: None,
            last_refresh_at: None,
            last_issued_at: Some(now),
        }
    }

    /// Entry seeded from a bare refresh token. The expiry sits at `now` so
    /// the very next read forces a refresh.
    pub fn seeded(refresh_token: String, now: DateTime<Utc>) -> Self {
        let token = Token {
            access_token: String::new(),
            token_type: String::new(),
            refresh_token: Some(refresh_token),
            expiry: Some(now),
            extra_data: Default::default(),
        };
        Self::issued(token, now)
    }

    /// Whether refresh is permanently off the table for this entry.
    pub fn permanently_failed(&self) -> bool {
        self.auth_server_error.as_ref().is_some_and(|err| err.permanent)
    }

    /// Apply a successful refresh: swap the token in, stamp the time, and
    /// clear any recorded failure.
    pub fn record_refresh_success(&mut self, token: Token, now: DateTime<Utc>) {
        self.token = token;
        self.auth_server_error = None;
        self.last_refresh_at = Some(now);
    }

    /// Record a failed refresh attempt. Permanent failures additionally
    /// blank the access token so nothing keeps serving it.
    pub fn record_refresh_failure(&mut self, err: &ProviderError, now: DateTime<Utc>) {
        let attempt_count =
            self.auth_server_error.as_ref().map_or(0, |prev| prev.attempt_count) + 1;
        let permanent = err.is_permanent();

        self.auth_server_error = Some(AuthServerError {
            code: err.oauth_code().unwrap_or("server_error").to_string(),
            description: Some(err.to_string()),
            permanent,
            last_attempt_at: now,
            attempt_count,
        });

        if permanent {
            self.token.access_token.clear();
        }
    }

    /// Encode at the latest schema generation.
    pub fn encode(&self) -> PersistenceResult<Vec<u8>> {
        let mut entry = self.clone();
        entry.version = CREDENTIAL_VERSION_LATEST;
        Ok(serde_json::to_vec(&entry)?)
    }

    /// Decode any supported schema generation, upgrading in memory.
    pub fn decode(bytes: &[u8]) -> PersistenceResult<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        match read_version(&value, KIND)? {
            1 => {
                let v1: CredentialEntryV1 = serde_json::from_value(value)?;
                Ok(v1.upgrade())
            }
            2 => Ok(serde_json::from_value(value)?),
            found => Err(PersistenceError::UnsupportedVersion {
                kind: KIND,
                found,
                supported: CREDENTIAL_VERSION_LATEST,
            }),
        }
    }
}

/// Generation 1: just the token, no failure bookkeeping.
#[derive(Debug, Deserialize)]
struct CredentialEntryV1 {
    #[allow(dead_code)]
    version: u32,
    token: Token,
}

impl CredentialEntryV1 {
    fn upgrade(self) -> CredentialEntry {
        CredentialEntry {
            version: CREDENTIAL_VERSION_LATEST,
            token: self.token,
            auth_server_error: None,
            last_refresh_at: None,
            last_issued_at: None,
        }
    }
}
