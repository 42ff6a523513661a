//! Error types for provider construction and OAuth protocol calls.
//!
//! Two families live here: [`RegistryError`] covers everything that can go
//! wrong while building a provider from the registry (unknown name, version
//! mismatch, bad options), and [`ProviderError`] covers the calls a built
//! provider makes against the authorization server.
//!
//! Classification matters more than the message text: the engine's read path
//! and background loops decide what to do with a failed refresh based on
//! [`ProviderError::is_retryable`] and [`ProviderError::is_permanent`].

use thiserror::Error;

/// Result alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// OAuth error codes that permanently disqualify a credential from refresh.
const PERMANENT_CODES: &[&str] = &["invalid_grant", "invalid_token", "access_denied", "expired_token"];

/// Errors raised while resolving or constructing providers.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No factory is registered under the requested name.
    #[error("no such provider {0:?}")]
    NoSuchProvider(String),

    /// The factory exists but cannot produce the requested version.
    #[error("provider {name:?} has no version {version}")]
    NoSuchProviderVersion { name: String, version: i32 },

    /// An option was missing, unknown, or carried an invalid value.
    #[error("invalid provider option {key:?}: {message}")]
    Option { key: String, message: String },

    /// A factory was registered twice under the same name.
    #[error("provider {0:?} is already registered")]
    AlreadyRegistered(String),
}

impl RegistryError {
    /// Convenience constructor for option validation failures.
    pub fn option(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Option { key: key.into(), message: message.into() }
    }
}

/// Errors raised by provider calls against the authorization server.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The server answered with an OAuth protocol error (RFC 6749 §5.2).
    #[error("authorization server error: {}", format_oauth(code, description.as_deref()))]
    Oauth {
        code: String,
        description: Option<String>,
    },

    /// The server answered 5xx; the request may succeed later.
    #[error("authorization server returned status {status}")]
    Server { status: u16 },

    /// The request never completed (connect failure, timeout, DNS, ...).
    #[error("request to authorization server failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The server answered 2xx but the body was not a usable token response.
    #[error("malformed authorization server response: {0}")]
    Response(String),

    /// The provider does not implement the requested grant.
    #[error("provider does not support {0}")]
    UnsupportedFlow(&'static str),
}

impl ProviderError {
    /// Build an OAuth protocol error.
    pub fn oauth(code: impl Into<String>, description: Option<String>) -> Self {
        Self::Oauth { code: code.into(), description }
    }

    /// The OAuth error code, when the server produced one.
    pub fn oauth_code(&self) -> Option<&str> {
        match self {
            Self::Oauth { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether retrying the same call later could succeed.
    ///
    /// Transport failures and 5xx responses are transient; protocol errors
    /// and malformed responses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Server { .. } => true,
            Self::Transport(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            Self::Oauth { .. } | Self::Response(_) | Self::UnsupportedFlow(_) => false,
        }
    }

    /// Whether this failure disqualifies the credential from further
    /// refresh attempts (revoked or invalid grant).
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Oauth { code, .. } => PERMANENT_CODES.contains(&code.as_str()),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err)
    }
}

fn format_oauth(code: &str, description: Option<&str>) -> String {
    match description {
        Some(desc) => format!("{code} ({desc})"),
        None => code.to_string(),
    }
}
