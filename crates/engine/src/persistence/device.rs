//! Pending device authorization entries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokensmith_provider::DeviceAuth;

use super::{read_version, PersistenceError, PersistenceResult};

/// Current device authorization schema generation.
pub const DEVICE_AUTH_VERSION_LATEST: u32 = 1;

const KIND: &str = "device authorization";

/// A device flow awaiting user approval.
///
/// Transient by nature: created by `device/auth`, deleted when the poll
/// terminates (grant, denial, or expiry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceAuthEntry {
    pub version: u32,
    /// Credential name the grant will materialize under.
    pub name: String,
    pub client_id: String,
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_uri_complete: Option<String>,
    /// Current minimum polling interval in seconds; grows on `slow_down`.
    pub interval_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub provider_options: BTreeMap<String, String>,
}

impl DeviceAuthEntry {
    /// Build an entry from a provider device authorization.
    pub fn new(
        name: String,
        client_id: String,
        auth: DeviceAuth,
        scopes: Vec<String>,
        provider_options: BTreeMap<String, String>,
    ) -> Self {
        Self {
            version: DEVICE_AUTH_VERSION_LATEST,
            name,
            client_id,
            device_code: auth.device_code,
            user_code: auth.user_code,
            verification_uri: auth.verification_uri,
            verification_uri_complete: auth.verification_uri_complete,
            interval_seconds: auth.interval,
            expires_at: auth.expires_at,
            scopes,
            provider_options,
        }
    }

    /// Whether the device code has aged out as of `now`.
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Encode at the latest schema generation.
    pub fn encode(&self) -> PersistenceResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode; there is only one generation so far, but future ones are
    /// still refused rather than guessed at.
    pub fn decode(bytes: &[u8]) -> PersistenceResult<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        match read_version(&value, KIND)? {
            1 => Ok(serde_json::from_value(value)?),
            found => Err(PersistenceError::UnsupportedVersion {
                kind: KIND,
                found,
                supported: DEVICE_AUTH_VERSION_LATEST,
            }),
        }
    }
}
