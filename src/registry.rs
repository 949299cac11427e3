//! URL registry: normalization, idempotent registration and removal.

use std::sync::Arc;

use crate::db::{MonitoredUrl, Store};
use crate::error::{Error, Result};
use crate::probe::{parse_target, ProbeError};

/// Normalize user input into the canonical form stored in the registry.
///
/// Surrounding whitespace is trimmed and `https://` is prefixed when no scheme
/// is given. The result must parse as an absolute http(s) URL with a host.
/// Otherwise the text is kept as typed, so lookups stay exact-match.
pub fn normalize_url(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidUrl {
            url: input.to_string(),
            reason: "empty URL".to_string(),
        });
    }

    let normalized = if has_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    parse_target(&normalized).map_err(|e| match e {
        ProbeError::InvalidTarget { reason, .. } => Error::InvalidUrl {
            url: input.to_string(),
            reason,
        },
        other => Error::Execution(other),
    })?;

    Ok(normalized)
}

/// Whether `input` starts with `scheme://`. A `://` later in the text, such
/// as in a query parameter, does not count.
fn has_scheme(input: &str) -> bool {
    let Some((scheme, _)) = input.split_once("://") else {
        return false;
    };

    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// The set of monitored URLs, backed by the store.
#[derive(Clone)]
pub struct Registry {
    store: Arc<Store>,
}

impl Registry {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Register `url`, returning the existing entry if it is already known.
    pub fn register(&self, url: &str) -> Result<MonitoredUrl> {
        let normalized = normalize_url(url)?;
        let (monitored, created) = self.store.get_or_insert_url(&normalized)?;
        if created {
            tracing::info!("Registry: Added {} (id {})", monitored.url, monitored.id);
        }
        Ok(monitored)
    }

    /// All registered URLs in insertion order.
    pub fn list(&self) -> Result<Vec<MonitoredUrl>> {
        Ok(self.store.get_urls()?)
    }

    pub fn get(&self, id: i64) -> Result<MonitoredUrl> {
        Ok(self.store.get_url(id)?)
    }

    /// Remove a URL and, by cascade, its whole history.
    pub fn remove(&self, id: i64) -> Result<()> {
        self.store.delete_url(id)?;
        tracing::info!("Registry: Removed url {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn temp_registry() -> (NamedTempFile, Registry) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        (tmp, Registry::new(store))
    }

    #[test]
    fn test_normalize_adds_https() {
        assert_eq!(normalize_url("example.com").unwrap(), "https://example.com");
        assert_eq!(normalize_url("  example.com/a?b=1 ").unwrap(), "https://example.com/a?b=1");
        assert_eq!(normalize_url("http://example.com").unwrap(), "http://example.com");
        assert_eq!(
            normalize_url("example.com/login?next=https://example.com/home").unwrap(),
            "https://example.com/login?next=https://example.com/home"
        );
        assert_eq!(
            normalize_url("example.com#https://frag").unwrap(),
            "https://example.com#https://frag"
        );
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        for input in ["", "   ", "ftp://example.com", "https://", "exa mple.com"] {
            assert!(
                matches!(normalize_url(input), Err(Error::InvalidUrl { .. })),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_register_is_idempotent() {
        let (_tmp, registry) = temp_registry();

        let first = registry.register("example.com").unwrap();
        let second = registry.register("https://example.com").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.url, "https://example.com");
        assert_eq!(registry.list().unwrap().len(), 1);
    }

    #[test]
    fn test_register_is_case_sensitive() {
        let (_tmp, registry) = temp_registry();

        let lower = registry.register("https://example.com/path").unwrap();
        let upper = registry.register("https://example.com/PATH").unwrap();
        assert_ne!(lower.id, upper.id);
    }

    #[test]
    fn test_invalid_register_has_no_side_effect() {
        let (_tmp, registry) = temp_registry();
        assert!(registry.register("ftp://example.com").is_err());
        assert!(registry.list().unwrap().is_empty());
    }

    #[test]
    fn test_remove() {
        let (_tmp, registry) = temp_registry();
        let a = registry.register("a.example").unwrap();
        let b = registry.register("b.example").unwrap();

        registry.remove(a.id).unwrap();
        let remaining = registry.list().unwrap();
        assert_eq!(remaining, vec![b]);

        assert!(matches!(registry.remove(a.id), Err(Error::NotFound)));
        assert!(matches!(registry.get(a.id), Err(Error::NotFound)));
    }
}
