//! Key/value store seam consumed by the guard.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Failure of a key/value store call.
///
/// Never used to signal an absent key; absence is `Ok(None)` / `Ok(false)`.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("key/value store unavailable: {0}")]
    Unavailable(String),
    #[error("key/value store call timed out")]
    Timeout,
    #[error("unexpected reply from key/value store: {0}")]
    Protocol(String),
}

impl KvError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }

    pub fn protocol(err: impl std::fmt::Display) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Shared, externally owned key/value store with per-key TTLs.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a key; `Ok(None)` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Write a key unconditionally with the given time to live.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError>;

    /// Atomically create a key only if it does not exist yet.
    ///
    /// Returns `Ok(false)` when the key is already present.
    async fn create_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, KvError>;

    /// Remove a key, returning whether anything was removed.
    async fn delete(&self, key: &str) -> Result<bool, KvError>;
}
