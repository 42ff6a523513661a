//! Versioned persisted records and the key schema they live under.
//!
//! Every record is a JSON object whose `version` field is an integer schema
//! generation. Decoders accept all historical generations, upgrading old
//! shapes in memory; encoding always emits the latest generation, so records
//! converge on the current layout at next write. A record from the *future*
//! (a newer generation than this build knows) is refused outright rather
//! than silently reinterpreted.
//!
//! The layer performs no locking; callers hold the relevant per-entity lock
//! across read-modify-write cycles.

pub mod config;
pub mod credential;
pub mod device;
pub mod keys;
pub mod self_cred;

use thiserror::Error;

pub use config::{ConfigEntry, ConfigTuning, CONFIG_VERSION_LATEST};
pub use credential::{AuthServerError, CredentialEntry, CREDENTIAL_VERSION_LATEST};
pub use device::{DeviceAuthEntry, DEVICE_AUTH_VERSION_LATEST};
pub use self_cred::{SelfCredentialEntry, SELF_CREDENTIAL_VERSION_LATEST};

/// Result alias for record encode/decode.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Failure to decode or encode a persisted record.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The record was written by a newer schema generation.
    #[error("persisted {kind} record has version {found}, newer than supported {supported}")]
    UnsupportedVersion { kind: &'static str, found: u64, supported: u32 },

    /// The record has no version tag at all.
    #[error("persisted {kind} record is missing its version tag")]
    MissingVersion { kind: &'static str },

    /// The record bytes are not a valid encoding.
    #[error("persisted record is malformed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Extract the integer version tag from a raw record.
pub(crate) fn read_version(
    value: &serde_json::Value,
    kind: &'static str,
) -> PersistenceResult<u64> {
    value
        .get("version")
        .and_then(serde_json::Value::as_u64)
        .ok_or(PersistenceError::MissingVersion { kind })
}
