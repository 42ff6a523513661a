//! The singleton configuration entry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokensmith_provider::LATEST_VERSION;

use super::{read_version, PersistenceError, PersistenceResult};

/// Current configuration schema generation.
pub const CONFIG_VERSION_LATEST: u32 = 2;

const KIND: &str = "config";

/// Mount configuration: OAuth client, provider selection, and tuning.
///
/// Exactly one exists once the mount is configured. `provider_version` is
/// pinned at write time; if the registry stops offering that version the
/// mount refuses to operate until reconfigured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub version: u32,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub auth_url_params: BTreeMap<String, String>,
    pub provider_name: String,
    pub provider_version: i32,
    #[serde(default)]
    pub provider_options: BTreeMap<String, String>,
    #[serde(default)]
    pub tuning: ConfigTuning,
}

impl ConfigEntry {
    /// Encode at the latest schema generation.
    pub fn encode(&self) -> PersistenceResult<Vec<u8>> {
        let mut entry = self.clone();
        entry.version = CONFIG_VERSION_LATEST;
        Ok(serde_json::to_vec(&entry)?)
    }

    /// Decode any supported schema generation, upgrading in memory.
    pub fn decode(bytes: &[u8]) -> PersistenceResult<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        match read_version(&value, KIND)? {
            1 => {
                let v1: ConfigEntryV1 = serde_json::from_value(value)?;
                Ok(v1.upgrade())
            }
            2 => Ok(serde_json::from_value(value)?),
            found => Err(PersistenceError::UnsupportedVersion {
                kind: KIND,
                found,
                supported: CONFIG_VERSION_LATEST,
            }),
        }
    }
}

/// Generation 1: no provider version pin, no tuning block.
#[derive(Debug, Deserialize)]
struct ConfigEntryV1 {
    #[allow(dead_code)]
    version: u32,
    client_id: String,
    client_secret: String,
    #[serde(default)]
    auth_url_params: BTreeMap<String, String>,
    provider_name: String,
    #[serde(default)]
    provider_options: BTreeMap<String, String>,
}

impl ConfigEntryV1 {
    fn upgrade(self) -> ConfigEntry {
        ConfigEntry {
            version: CONFIG_VERSION_LATEST,
            client_id: self.client_id,
            client_secret: self.client_secret,
            auth_url_params: self.auth_url_params,
            provider_name: self.provider_name,
            // Generation 1 predates version pinning; legacy entries resolve
            // to whatever the registry currently offers.
            provider_version: LATEST_VERSION,
            provider_options: self.provider_options,
            tuning: ConfigTuning::default(),
        }
    }
}

/// Tuning knobs for timeouts and the background loops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigTuning {
    /// Per-request deadline for provider calls in seconds; 0 means no
    /// deadline.
    pub provider_timeout_seconds: u64,

    /// Multiplier applied to the provider timeout when refreshing a token
    /// that has already expired. At least 1.
    pub provider_timeout_expiry_leeway_factor: f64,

    /// Period of the refresh loop in seconds; 0 disables the loop.
    pub refresh_check_interval_seconds: u64,

    /// Multiplier on the refresh interval used to spot tokens that would
    /// expire before the next sweep. At least 1.
    pub refresh_expiry_delta_factor: f64,

    /// Period of the reap loop in seconds; 0 disables the loop.
    pub reap_check_interval_seconds: u64,

    /// Report reapable credentials instead of deleting them.
    pub reap_dry_run: bool,

    /// Grace past expiry before reaping a credential without a refresh
    /// token; 0 disables the criterion.
    pub reap_non_refreshable_seconds: u64,

    /// Grace past expiry before reaping a credential whose refresh token was
    /// revoked; 0 disables the criterion.
    pub reap_revoked_seconds: u64,

    /// Minimum failed refresh attempts before the transient criterion
    /// applies; 0 disables it.
    pub reap_transient_error_attempts: u32,

    /// Grace past expiry before the transient criterion applies; 0 disables
    /// it.
    pub reap_transient_error_seconds: u64,
}

impl Default for ConfigTuning {
    fn default() -> Self {
        Self {
            provider_timeout_seconds: 30,
            provider_timeout_expiry_leeway_factor: 1.5,
            refresh_check_interval_seconds: 60,
            refresh_expiry_delta_factor: 1.2,
            reap_check_interval_seconds: 300,
            reap_dry_run: false,
            reap_non_refreshable_seconds: 86_400,
            reap_revoked_seconds: 3_600,
            reap_transient_error_attempts: 10,
            reap_transient_error_seconds: 86_400,
        }
    }
}

const MAX_REFRESH_CHECK_INTERVAL_SECONDS: u64 = 90 * 24 * 60 * 60;
const MAX_REAP_CHECK_INTERVAL_SECONDS: u64 = 180 * 24 * 60 * 60;

impl ConfigTuning {
    /// Validate the tuning bounds; the message is caller-visible.
    pub fn validate(&self) -> Result<(), String> {
        if self.provider_timeout_expiry_leeway_factor < 1.0 {
            return Err("provider timeout expiry leeway factor must be at least 1.0".into());
        }
        if self.refresh_check_interval_seconds > MAX_REFRESH_CHECK_INTERVAL_SECONDS {
            return Err("refresh check interval can be at most 90 days".into());
        }
        if self.refresh_expiry_delta_factor < 1.0 {
            return Err("refresh expiry delta factor must be at least 1.0".into());
        }
        if self.reap_check_interval_seconds > MAX_REAP_CHECK_INTERVAL_SECONDS {
            return Err("reap check interval can be at most 180 days".into());
        }
        Ok(())
    }

    /// HTTP deadline for a provider call; `expired` selects the leeway
    /// multiplier for tokens that have already lapsed.
    pub fn provider_timeout(&self, expired: bool) -> Option<std::time::Duration> {
        if self.provider_timeout_seconds == 0 {
            return None;
        }
        let base = self.provider_timeout_seconds as f64;
        let seconds =
            if expired { base * self.provider_timeout_expiry_leeway_factor } else { base };
        Some(std::time::Duration::from_secs_f64(seconds))
    }
}
