//! Name → factory registry for provider construction.
//!
//! The registry is populated once at plugin start and shared read-only after
//! that. Factories are pure: they validate their options (unknown keys are
//! rejected, declared ones are required) and must accept both
//! [`LATEST_VERSION`] and the exact version a config entry pinned earlier.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::traits::Provider;

/// Sentinel accepted by factories in place of an exact version.
pub const LATEST_VERSION: i32 = -1;

/// A provider factory: builds an instance for the requested version from
/// caller-supplied options.
pub type Factory = Arc<
    dyn Fn(i32, &BTreeMap<String, String>) -> Result<Arc<dyn Provider>, RegistryError>
        + Send
        + Sync,
>;

/// Process-scoped provider registry.
#[derive(Default)]
pub struct Registry {
    factories: HashMap<String, Factory>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the stock adapters (`basic`, `oidc`)
    /// registered.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry
            .register("basic", crate::basic::factory())
            .expect("stock provider names are distinct");
        registry
            .register("oidc", crate::oidc::factory())
            .expect("stock provider names are distinct");
        registry
    }

    /// Register a factory under `name`.
    ///
    /// # Errors
    /// Returns [`RegistryError::AlreadyRegistered`] if the name is taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: Factory,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Build a provider instance.
    ///
    /// `version` is either [`LATEST_VERSION`] or the exact version pinned by
    /// an existing configuration.
    ///
    /// # Errors
    /// Returns [`RegistryError::NoSuchProvider`] for unknown names; factory
    /// errors (version mismatch, option validation) pass through.
    pub fn build(
        &self,
        name: &str,
        version: i32,
        options: &BTreeMap<String, String>,
    ) -> Result<Arc<dyn Provider>, RegistryError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RegistryError::NoSuchProvider(name.to_string()))?;
        factory(version, options)
    }

    /// Names of all registered providers, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Validate that `options` contains no keys outside `allowed`.
///
/// Factories call this after consuming the options they understand.
pub fn reject_unknown_options(
    options: &BTreeMap<String, String>,
    allowed: &[&str],
) -> Result<(), RegistryError> {
    for key in options.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(RegistryError::option(key, "unexpected"));
        }
    }
    Ok(())
}

/// Fetch a required option or fail with a descriptive error.
pub fn require_option<'a>(
    options: &'a BTreeMap<String, String>,
    key: &str,
) -> Result<&'a str, RegistryError> {
    options
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| RegistryError::option(key, "not found"))
}
