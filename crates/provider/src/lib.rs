//! OAuth 2 provider registry and adapters for the tokensmith secrets engine.
//!
//! The engine is configured with a named provider; this crate owns that
//! abstraction end to end:
//!
//! - [`Registry`] maps names to factories and enforces version pinning and
//!   option validation at construction time.
//! - [`Provider`] is the capability seam every adapter implements:
//!   authorization-code exchange, refresh, client credentials, device
//!   authorization (RFC 8628), and token exchange (RFC 8693).
//! - [`builders`] is the value-builder surface callers compose flow inputs
//!   with; configs close over endpoints, merged URL parameters, and timeouts.
//! - [`basic`] and [`oidc`] are the stock adapters.
//!
//! Adapters never touch persistence; they turn requests into HTTP calls and
//! responses into [`Token`]s, nothing more.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod basic;
pub mod builders;
pub mod error;
mod http;
pub mod oidc;
pub mod registry;
pub mod token;
pub mod traits;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use builders::{AuthCodeUrlBuilder, AuthCodeUrlConfig, ExchangeBuilder, ExchangeConfig, TokenSource};
pub use error::{ProviderError, ProviderResult, RegistryError};
pub use registry::{Factory, Registry, LATEST_VERSION};
pub use token::{DeviceAuth, DevicePoll, Token, TOKEN_TYPE_BEARER};
pub use traits::{
    AuthCodeExchange, ClientCredentialsExchange, DeviceAuthRequest, DeviceExchangeRequest,
    Provider, RefreshExchange, TokenExchangeRequest,
};
