//! Engine error types.
//!
//! Operations surface exactly one error enum to the host. The variants map
//! onto how the host should react: [`EngineError::User`] is a visible,
//! non-fatal response to the caller; [`EngineError::NotConfigured`] and the
//! registry variants mean the mount needs (re)configuration; provider errors
//! carry their own retryable/permanent classification; store and persistence
//! failures are fatal to the current operation only.

use thiserror::Error;
use tokensmith_provider::{ProviderError, RegistryError};

use crate::persistence::PersistenceError;
use crate::store::StoreError;

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the credential lifecycle core.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid input or failed validation; reported verbatim to the caller.
    #[error("{0}")]
    User(String),

    /// The operation needs a configuration entry that does not exist.
    #[error("not configured")]
    NotConfigured,

    /// The pinned provider version is no longer offered by the registry;
    /// every dependent operation fails until the mount is reconfigured.
    #[error("provider {name:?} no longer offers version {version}; reconfigure this mount")]
    ProviderVersionUnavailable { name: String, version: i32 },

    /// Provider registry failure other than a version mismatch.
    #[error(transparent)]
    Registry(RegistryError),

    /// The authorization server call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The host storage backend failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A persisted record could not be decoded or encoded.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl EngineError {
    /// Build a caller-visible input error.
    pub fn user(message: impl Into<String>) -> Self {
        Self::User(message.into())
    }

    /// Whether this error should be rendered to the caller as a plain
    /// response rather than an internal failure.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, Self::User(_) | Self::NotConfigured)
    }
}

impl From<RegistryError> for EngineError {
    fn from(err: RegistryError) -> Self {
        match err {
            // Bad names and bad options are the caller's to fix.
            RegistryError::NoSuchProvider(name) => {
                Self::User(format!("provider {name:?} does not exist"))
            }
            RegistryError::Option { ref key, ref message } => {
                Self::User(format!("invalid provider option {key:?}: {message}"))
            }
            other => Self::Registry(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_such_provider_is_user_visible() {
        let err: EngineError = RegistryError::NoSuchProvider("nope".into()).into();
        assert!(err.is_user_visible());
        assert_eq!(err.to_string(), "provider \"nope\" does not exist");
    }

    #[test]
    fn option_errors_are_user_visible() {
        let err: EngineError = RegistryError::option("token_url", "not found").into();
        assert!(err.is_user_visible());
    }

    #[test]
    fn version_mismatch_is_not_user_visible() {
        let err: EngineError =
            RegistryError::NoSuchProviderVersion { name: "basic".into(), version: 9 }.into();
        assert!(!err.is_user_visible());
        assert!(matches!(err, EngineError::Registry(_)));
    }
}
