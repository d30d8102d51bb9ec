//! Read-through guard for one identifier.
//!
//! A [`CacheGuard`] is built per logical operation. Concurrent guards for the
//! same identifier coordinate only through the key/value store: the fill
//! lock, the tombstone and the populated blob all live there.

use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, instrument, warn};

use crate::application::repos::RecordStore;
use crate::domain::Entity;

use super::config::GuardConfig;
use super::error::GuardError;
use super::keys::{CacheKey, LockKey, TOMBSTONE};
use super::lock::StoreLock;
use super::store::KeyValueStore;
use super::ttl::ExpirationPolicy;

const METRIC_HIT: &str = "productguard_cache_hit_total";
const METRIC_MISS: &str = "productguard_cache_miss_total";
const METRIC_TOMBSTONE_HIT: &str = "productguard_tombstone_hit_total";
const METRIC_RECORD_READ: &str = "productguard_record_read_total";
const METRIC_LOCK_FALLBACK: &str = "productguard_lock_fallback_total";
const METRIC_WRITE_FAILED: &str = "productguard_cache_write_failed_total";
const METRIC_FILL_MS: &str = "productguard_fill_ms";

pub struct CacheGuard<'a, S: ?Sized, R: ?Sized> {
    id: i64,
    cache_key: CacheKey,
    lock: StoreLock<'a, S>,
    cache: &'a S,
    records: &'a R,
    expiration: ExpirationPolicy,
}

impl<'a, S, R> CacheGuard<'a, S, R>
where
    S: KeyValueStore + ?Sized,
    R: RecordStore + ?Sized,
{
    pub fn new(id: i64, cache: &'a S, records: &'a R, config: &GuardConfig) -> Self {
        let entity = Self::entity();
        Self {
            id,
            cache_key: CacheKey::new(&config.namespace, entity, id),
            lock: StoreLock::new(
                cache,
                LockKey::new(&config.namespace, entity, id),
                config.lock_options(),
            ),
            cache,
            records,
            expiration: config.expiration(),
        }
    }

    fn entity() -> &'static str {
        <R::Record as Entity>::NAME
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn cache_key(&self) -> &CacheKey {
        &self.cache_key
    }

    pub fn lock_key(&self) -> &LockKey {
        self.lock.key()
    }

    /// Return the cached blob, filling it from the record store on a miss.
    ///
    /// Dropping the returned future while it holds the fill lock skips the
    /// release: the lock then lives until its TTL and waiters block until
    /// then.
    #[instrument(skip_all, fields(key = %self.cache_key))]
    pub async fn get(&self) -> Result<String, GuardError> {
        if let Some(value) = self.read_cache().await? {
            return self.on_hit(value);
        }
        counter!(METRIC_MISS, "entity" => Self::entity()).increment(1);

        match self.lock.lock().await {
            Ok(()) => {
                let outcome = self.fill_locked().await;
                self.lock.unlock().await;
                outcome
            }
            Err(err) => {
                counter!(METRIC_LOCK_FALLBACK, "entity" => Self::entity()).increment(1);
                warn!(
                    key = %self.lock.key(),
                    error = %err,
                    "Lock unavailable, reading record store without mutual exclusion"
                );
                self.fill().await
            }
        }
    }

    /// Re-read the record and push it into the cache with a jittered TTL.
    ///
    /// Not locked: it runs once per change notification, not per miss.
    /// A record that no longer exists is replaced by a tombstone.
    #[instrument(skip_all, fields(key = %self.cache_key))]
    pub async fn refresh(&self) -> Result<(), GuardError> {
        match self.load().await? {
            Some(blob) => {
                let ttl = self.expiration.populated_ttl();
                self.cache.set(self.cache_key.as_str(), &blob, ttl).await?;
                debug!(
                    key = %self.cache_key,
                    ttl_ms = ttl.as_millis() as u64,
                    "Refreshed cache entry"
                );
                Ok(())
            }
            None => {
                self.write_best_effort(TOMBSTONE, "tombstone").await;
                Err(self.not_found())
            }
        }
    }

    /// Drop the cached state so the next read goes to the record store.
    ///
    /// Returns whether an entry was removed.
    #[instrument(skip_all, fields(key = %self.cache_key))]
    pub async fn delete(&self) -> Result<bool, GuardError> {
        remove_entry(self.cache, &self.cache_key).await
    }

    async fn read_cache(&self) -> Result<Option<String>, GuardError> {
        self.cache
            .get(self.cache_key.as_str())
            .await
            .map_err(|err| {
                warn!(key = %self.cache_key, error = %err, "Cache read failed");
                GuardError::from(err)
            })
    }

    fn on_hit(&self, value: String) -> Result<String, GuardError> {
        if value == TOMBSTONE {
            counter!(METRIC_TOMBSTONE_HIT, "entity" => Self::entity()).increment(1);
            return Err(self.not_found());
        }
        counter!(METRIC_HIT, "entity" => Self::entity()).increment(1);
        Ok(value)
    }

    async fn fill_locked(&self) -> Result<String, GuardError> {
        // Another holder may have filled the key while we waited.
        if let Some(value) = self.read_cache().await? {
            return self.on_hit(value);
        }
        self.fill().await
    }

    async fn fill(&self) -> Result<String, GuardError> {
        let started = Instant::now();
        let outcome = match self.load().await {
            Ok(Some(blob)) => {
                self.write_best_effort(&blob, "fill").await;
                Ok(blob)
            }
            Ok(None) => {
                self.write_best_effort(TOMBSTONE, "tombstone").await;
                Err(self.not_found())
            }
            Err(err) => Err(err),
        };
        histogram!(METRIC_FILL_MS, "entity" => Self::entity())
            .record(started.elapsed().as_secs_f64() * 1000.0);
        outcome
    }

    async fn load(&self) -> Result<Option<String>, GuardError> {
        counter!(METRIC_RECORD_READ, "entity" => Self::entity()).increment(1);
        let record = self
            .records
            .get_by_identifier(self.id)
            .await
            .map_err(|err| {
                warn!(id = self.id, error = %err, "Record store read failed");
                GuardError::from(err)
            })?;

        match record {
            Some(record) => Ok(Some(serde_json::to_string(&record)?)),
            None => Ok(None),
        }
    }

    /// Write a blob or tombstone; failures are logged and counted only.
    async fn write_best_effort(&self, value: &str, kind: &'static str) {
        let ttl = if value == TOMBSTONE {
            self.expiration.tombstone_ttl()
        } else {
            self.expiration.populated_ttl()
        };

        match self.cache.set(self.cache_key.as_str(), value, ttl).await {
            Ok(()) => {
                debug!(
                    key = %self.cache_key,
                    kind,
                    ttl_ms = ttl.as_millis() as u64,
                    "Cache entry written"
                );
            }
            Err(err) => {
                counter!(METRIC_WRITE_FAILED, "kind" => kind).increment(1);
                warn!(
                    key = %self.cache_key,
                    kind,
                    error = %err,
                    result = "skipped",
                    "Cache write failed, returning record store result"
                );
            }
        }
    }

    fn not_found(&self) -> GuardError {
        GuardError::NotFound {
            entity: Self::entity(),
            id: self.id,
        }
    }
}

/// Drop the cache entry for `id` of entity `E` without a record store.
///
/// Returns whether an entry was removed.
#[instrument(skip_all, fields(id = id))]
pub async fn evict<E, S>(id: i64, cache: &S, config: &GuardConfig) -> Result<bool, GuardError>
where
    E: Entity,
    S: KeyValueStore + ?Sized,
{
    let key = CacheKey::new(&config.namespace, E::NAME, id);
    remove_entry(cache, &key).await
}

async fn remove_entry<S>(cache: &S, key: &CacheKey) -> Result<bool, GuardError>
where
    S: KeyValueStore + ?Sized,
{
    let removed = cache.delete(key.as_str()).await?;
    debug!(key = %key, removed, "Deleted cache entry");
    Ok(removed)
}
