//! Cache key definitions.
//!
//! `CacheKey` addresses an entity's cached state; `LockKey` addresses the
//! ephemeral mutual-exclusion token guarding its fill.

use std::fmt;

/// Cached value meaning "confirmed absent in the record store".
///
/// Never a valid JSON document, so it cannot collide with a serialized record.
pub const TOMBSTONE: &str = "*";

/// Key holding an entity's cached blob or tombstone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// `<namespace>:<entity>:<id>`
    pub fn new(namespace: &str, entity: &str, id: i64) -> Self {
        Self(format!("{namespace}:{entity}:{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key of the store-backed lock serializing fills for one identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey(String);

impl LockKey {
    /// `<namespace>:lock:<entity>:<id>`
    pub fn new(namespace: &str, entity: &str, id: i64) -> Self {
        Self(format!("{namespace}:lock:{entity}:{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_layout() {
        let key = CacheKey::new("openapi", "product", 42);
        assert_eq!(key.as_str(), "openapi:product:42");
        assert_eq!(key.to_string(), "openapi:product:42");
    }

    #[test]
    fn lock_key_lives_in_its_own_namespace() {
        let cache = CacheKey::new("openapi", "product", 42);
        let lock = LockKey::new("openapi", "product", 42);
        assert_eq!(lock.as_str(), "openapi:lock:product:42");
        assert_ne!(cache.as_str(), lock.as_str());
    }

    #[test]
    fn keys_are_deterministic_per_identifier() {
        assert_eq!(
            CacheKey::new("openapi", "product", 7),
            CacheKey::new("openapi", "product", 7)
        );
        assert_ne!(
            CacheKey::new("openapi", "product", 7),
            CacheKey::new("openapi", "product", 8)
        );
    }

    #[test]
    fn tombstone_is_not_json() {
        assert!(serde_json::from_str::<serde_json::Value>(TOMBSTONE).is_err());
    }
}
