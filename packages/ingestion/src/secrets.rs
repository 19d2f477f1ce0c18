//! Secret indirection for source configuration.
//!
//! Any config string of the form `SECRET:NAME` is resolved against the
//! injected resolver at run time. Resolved values never reach raw-page
//! sidecars or logs.

use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;

/// Resolves named secrets. Implementations must not log values.
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<SecretString>;
}

/// Environment-backed resolver (the production default).
#[derive(Debug, Default)]
pub struct EnvSecrets;

impl SecretResolver for EnvSecrets {
    fn resolve(&self, name: &str) -> Option<SecretString> {
        std::env::var(name).ok().map(SecretString::from)
    }
}

/// Fixed-map resolver for tests.
#[derive(Debug, Default)]
pub struct StaticSecrets {
    values: HashMap<String, String>,
}

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl SecretResolver for StaticSecrets {
    fn resolve(&self, name: &str) -> Option<SecretString> {
        self.values.get(name).cloned().map(SecretString::from)
    }
}

/// Expand `SECRET:NAME` indirection in a config value.
///
/// Plain strings pass through untouched. Unresolvable references return
/// `Err(name)` so callers can report `missing_secrets` without ever
/// seeing a value.
pub fn expand(resolver: &dyn SecretResolver, value: &str) -> Result<String, String> {
    match value.strip_prefix("SECRET:") {
        Some(name) => resolver
            .resolve(name)
            .map(|s| s.expose_secret().to_string())
            .ok_or_else(|| name.to_string()),
        None => Ok(value.to_string()),
    }
}

/// Check a list of secret references, returning the names that fail to
/// resolve. Used by the admin `test` probe.
pub fn missing(resolver: &dyn SecretResolver, refs: &[String]) -> Vec<String> {
    refs.iter()
        .filter(|name| resolver.resolve(name).is_none())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_values_pass_through() {
        let resolver = StaticSecrets::new();
        assert_eq!(expand(&resolver, "abc123").unwrap(), "abc123");
    }

    #[test]
    fn secret_refs_resolve() {
        let resolver = StaticSecrets::new().with("BOARD_TOKEN", "tok-1");
        assert_eq!(expand(&resolver, "SECRET:BOARD_TOKEN").unwrap(), "tok-1");
    }

    #[test]
    fn unresolved_refs_report_the_name() {
        let resolver = StaticSecrets::new();
        assert_eq!(
            expand(&resolver, "SECRET:BOARD_TOKEN").unwrap_err(),
            "BOARD_TOKEN"
        );
        assert_eq!(
            missing(&resolver, &["A".into(), "B".into()]),
            vec!["A".to_string(), "B".to_string()]
        );
    }
}
