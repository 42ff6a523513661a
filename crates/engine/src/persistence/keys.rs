//! Storage key schema.
//!
//! All keys sit under the mount prefix the host assigns; the engine never
//! sees that prefix. Credential names are opaque and may contain `/`.

/// Singleton configuration entry.
pub const CONFIG: &str = "config";

/// Prefix for caller-managed credentials.
pub const CREDS_PREFIX: &str = "creds/";

/// Prefix for client-credentials ("self") tokens.
pub const SELF_PREFIX: &str = "self/";

/// Prefix for pending device authorizations.
pub const DEVICES_PREFIX: &str = "devices/";

/// Key for the credential named `name`.
pub fn credential(name: &str) -> String {
    format!("{CREDS_PREFIX}{name}")
}

/// Key for the self credential named `name`.
pub fn self_credential(name: &str) -> String {
    format!("{SELF_PREFIX}{name}")
}

/// Key for the pending device authorization identified by `id`.
pub fn device(id: &str) -> String {
    format!("{DEVICES_PREFIX}{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_may_contain_slashes() {
        assert_eq!(credential("team/alice"), "creds/team/alice");
        assert_eq!(self_credential("svc/batch"), "self/svc/batch");
        assert_eq!(device("team/alice"), "devices/team/alice");
    }
}
