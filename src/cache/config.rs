//! Cache guard configuration.
//!
//! Controls key namespace, expirations and lock timing via the `[cache]`
//! section of `productguard.toml`.

use std::time::Duration;

use serde::Deserialize;

use super::lock::LockOptions;
use super::ttl::ExpirationPolicy;

pub(crate) const DEFAULT_NAMESPACE: &str = "openapi";
pub(crate) const DEFAULT_EXPIRE_SECS: u64 = 365 * 24 * 3600;
pub(crate) const DEFAULT_EXPIRE_NOT_FOUND_SECS: u64 = 24 * 3600;
pub(crate) const DEFAULT_EXPIRE_JITTER_SECS: u64 = 24 * 3600;
pub(crate) const DEFAULT_LOCK_TTL_MS: u64 = 1_000;
pub(crate) const DEFAULT_LOCK_RETRY_MS: u64 = 10;
pub(crate) const DEFAULT_LOCK_WAIT_MS: u64 = 30_000;
pub(crate) const DEFAULT_UNLOCK_ATTEMPTS: u32 = 3;

/// Guard configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Prefix shared by cache and lock keys.
    pub namespace: String,
    /// Base TTL of populated entries, in seconds.
    pub expire_seconds: u64,
    /// TTL of tombstones, in seconds.
    pub expire_not_found_seconds: u64,
    /// Upper bound of the random offset added to populated entries, in seconds.
    pub expire_jitter_seconds: u64,
    /// Self-expiry of a held lock, in milliseconds.
    pub lock_ttl_ms: u64,
    /// Backoff between contended lock attempts, in milliseconds.
    pub lock_retry_ms: u64,
    /// Total time a caller waits for a contended lock, in milliseconds.
    pub lock_wait_ms: u64,
    /// Delete attempts made when releasing a lock.
    pub unlock_attempts: u32,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            expire_seconds: DEFAULT_EXPIRE_SECS,
            expire_not_found_seconds: DEFAULT_EXPIRE_NOT_FOUND_SECS,
            expire_jitter_seconds: DEFAULT_EXPIRE_JITTER_SECS,
            lock_ttl_ms: DEFAULT_LOCK_TTL_MS,
            lock_retry_ms: DEFAULT_LOCK_RETRY_MS,
            lock_wait_ms: DEFAULT_LOCK_WAIT_MS,
            unlock_attempts: DEFAULT_UNLOCK_ATTEMPTS,
        }
    }
}

impl From<&crate::config::CacheSettings> for GuardConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            namespace: settings.namespace.clone(),
            expire_seconds: settings.expire.as_secs(),
            expire_not_found_seconds: settings.expire_not_found.as_secs(),
            expire_jitter_seconds: settings.expire_jitter.as_secs(),
            lock_ttl_ms: duration_millis(settings.lock_ttl),
            lock_retry_ms: duration_millis(settings.lock_retry),
            lock_wait_ms: duration_millis(settings.lock_wait),
            unlock_attempts: settings.unlock_attempts.get(),
        }
    }
}

impl GuardConfig {
    pub fn expiration(&self) -> ExpirationPolicy {
        ExpirationPolicy {
            expire: Duration::from_secs(self.expire_seconds),
            expire_not_found: Duration::from_secs(self.expire_not_found_seconds),
            jitter: Duration::from_secs(self.expire_jitter_seconds),
        }
    }

    /// Lock timing, clamping zero TTL and retry interval to one millisecond.
    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            ttl: Duration::from_millis(self.lock_ttl_ms.max(1)),
            retry_interval: Duration::from_millis(self.lock_retry_ms.max(1)),
            max_wait: Duration::from_millis(self.lock_wait_ms),
            unlock_attempts: self.unlock_attempts.max(1),
        }
    }
}

fn duration_millis(value: Duration) -> u64 {
    u64::try_from(value.as_millis()).unwrap_or(u64::MAX)
}
