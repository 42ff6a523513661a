//! Credential lifecycle core of the tokensmith OAuth 2 secrets engine.
//!
//! The engine completes authorization-code exchanges on behalf of callers,
//! persists the resulting tokens in a host-supplied key/value [`Store`],
//! serves valid access tokens on demand, and keeps stored credentials
//! healthy in the background: a refresh loop renews tokens before they
//! expire, a reap loop deletes credentials that can no longer be revived.
//!
//! The host mounts the engine by constructing a [`Backend`] with its store
//! and a provider [`Registry`](tokensmith_provider::Registry), then routes
//! typed requests to the operation methods. Request routing, field parsing,
//! and authorization of callers are the host's concern; everything behind
//! that line — the versioned data model, per-credential locking, the cached
//! (config, provider) bundle, and the two background workers — lives here.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod backend;
pub mod cache;
pub mod clock;
pub mod credentials;
pub mod error;
pub mod locking;
pub mod persistence;
mod scheduling;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use backend::Backend;
pub use clock::{Clock, MockClock, SystemClock};
pub use error::{EngineError, EngineResult};
pub use store::{Store, StoreError, StoreResult};
