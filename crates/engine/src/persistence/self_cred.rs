//! Client-credentials ("self") token entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokensmith_provider::Token;

use super::{read_version, PersistenceError, PersistenceResult};

/// Current self-credential schema generation.
pub const SELF_CREDENTIAL_VERSION_LATEST: u32 = 1;

const KIND: &str = "self credential";

/// A token the engine maintains for the configured client itself.
///
/// Never carries a refresh token; "refresh" is simply another
/// client-credentials grant with the stored scopes. The background loops
/// leave these alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfCredentialEntry {
    pub version: u32,
    pub token: Token,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_issued_at: Option<DateTime<Utc>>,
}

impl SelfCredentialEntry {
    /// Entry for a freshly issued token under the requested scopes.
    pub fn issued(token: Token, scopes: Vec<String>, now: DateTime<Utc>) -> Self {
        Self { version: SELF_CREDENTIAL_VERSION_LATEST, token, scopes, last_issued_at: Some(now) }
    }

    /// Encode at the latest schema generation.
    pub fn encode(&self) -> PersistenceResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode; refuses future generations.
    pub fn decode(bytes: &[u8]) -> PersistenceResult<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        match read_version(&value, KIND)? {
            1 => Ok(serde_json::from_value(value)?),
            found => Err(PersistenceError::UnsupportedVersion {
                kind: KIND,
                found,
                supported: SELF_CREDENTIAL_VERSION_LATEST,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let token = Token {
            access_token: "self-token".into(),
            token_type: "Bearer".into(),
            refresh_token: None,
            expiry: None,
            extra_data: Default::default(),
        };
        let entry = SelfCredentialEntry::issued(token, vec!["read".into()], Utc::now());
        let decoded = SelfCredentialEntry::decode(&entry.encode().unwrap()).unwrap();
        assert_eq!(decoded, entry);
    }
}
