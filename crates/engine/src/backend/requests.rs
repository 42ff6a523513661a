//! Typed operation inputs and outputs.
//!
//! The host router owns path matching, field parsing, and schema validation;
//! by the time a request reaches the engine it is one of these structs.
//! Responses serialize to the wire shape the host returns to callers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::persistence::{ConfigTuning, CredentialEntry, SelfCredentialEntry};

/// `config` update.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigUpdateRequest {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Registry name of the provider to use.
    pub provider: String,
    #[serde(default)]
    pub provider_options: BTreeMap<String, String>,
    /// Query parameters merged into every authorization URL.
    #[serde(default)]
    pub auth_url_params: BTreeMap<String, String>,
    #[serde(default)]
    pub tuning: ConfigTuning,
}

/// `config` read. The client secret is deliberately absent.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigReadResponse {
    pub client_id: String,
    pub auth_url_params: BTreeMap<String, String>,
    pub provider: String,
    pub provider_version: i32,
    pub provider_options: BTreeMap<String, String>,
    pub tuning: ConfigTuning,
}

/// `config/auth_code_url` update.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthCodeUrlRequest {
    pub state: String,
    #[serde(default)]
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub auth_url_params: BTreeMap<String, String>,
    #[serde(default)]
    pub provider_options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthCodeUrlResponse {
    pub url: String,
}

/// `creds/<name>` update: either an authorization-code exchange or a
/// refresh-token seed, never both.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialWriteRequest {
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub auth_url_params: BTreeMap<String, String>,
    #[serde(default)]
    pub provider_options: BTreeMap<String, String>,
}

/// `creds/<name>` and `self/<name>` read.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialReadRequest {
    pub name: String,
    /// Require the returned token to stay valid at least this long,
    /// forcing a refresh if the stored one falls short.
    #[serde(default)]
    pub minimum_seconds: Option<u64>,
}

/// Token material returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_data: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_refresh_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_issued_at: Option<DateTime<Utc>>,
    /// Present when a due refresh failed transiently and the stale token is
    /// being served instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_warning: Option<String>,
}

impl CredentialResponse {
    pub(crate) fn from_entry(entry: &CredentialEntry, refresh_warning: Option<String>) -> Self {
        Self {
            access_token: entry.token.access_token.clone(),
            token_type: entry.token.token_type().to_string(),
            expiry: entry.token.expiry,
            extra_data: entry.token.extra_data.clone(),
            last_refresh_at: entry.last_refresh_at,
            last_issued_at: entry.last_issued_at,
            refresh_warning,
        }
    }

    pub(crate) fn from_self_entry(entry: &SelfCredentialEntry) -> Self {
        Self {
            access_token: entry.token.access_token.clone(),
            token_type: entry.token.token_type().to_string(),
            expiry: entry.token.expiry,
            extra_data: entry.token.extra_data.clone(),
            last_refresh_at: None,
            last_issued_at: entry.last_issued_at,
            refresh_warning: None,
        }
    }
}

/// `sts/<name>` update: RFC 8693 exchange of the stored credential.
#[derive(Debug, Clone, Deserialize)]
pub struct StsRequest {
    pub name: String,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StsResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

/// `device/auth` update.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceAuthOpRequest {
    /// Credential name the grant will materialize under.
    pub name: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub provider_options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceAuthOpResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_uri_complete: Option<String>,
    /// Minimum seconds between polls.
    pub interval: u64,
    /// Seconds until the device code stops being exchangeable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
}

/// `device/exchange` update.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceExchangeOpRequest {
    pub name: String,
}

/// Outcome of one device poll.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeviceExchangeOpResponse {
    /// The user has not finished authorizing; poll again after `interval`
    /// seconds.
    Pending { interval: u64 },
    /// The grant completed and the credential now exists.
    Issued(CredentialResponse),
}

/// `self/<name>` update.
#[derive(Debug, Clone, Deserialize)]
pub struct SelfWriteRequest {
    pub name: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}
