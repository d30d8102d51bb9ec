//! Store-backed mutual exclusion.
//!
//! A lock is a key created with `create_if_absent` and a short self-expiry.
//! Holders in different processes coordinate only through the shared store,
//! so no in-process mutex is involved.

use std::time::Duration;

use metrics::counter;
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};
use uuid::Uuid;

use super::keys::LockKey;
use super::store::{KeyValueStore, KvError};

const METRIC_LOCK_WAIT: &str = "productguard_lock_wait_total";
const METRIC_LOCK_ABANDONED: &str = "productguard_lock_abandoned_total";

/// Lock timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Self-expiry of a held lock; bounds how long a lost unlock blocks others.
    pub ttl: Duration,
    /// Fixed backoff between contended attempts.
    pub retry_interval: Duration,
    /// Total wait budget under contention before giving up.
    pub max_wait: Duration,
    /// Delete attempts on release before abandoning the lock to its TTL.
    pub unlock_attempts: u32,
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock store unavailable: {0}")]
    Unavailable(#[source] KvError),
    #[error("gave up waiting for lock `{key}` after {waited:?}")]
    TimedOut { key: String, waited: Duration },
}

/// Exclusive ownership of one [`LockKey`], acquired through a [`KeyValueStore`].
///
/// `lock` is cancel-safe: dropping its future between attempts leaves nothing
/// behind, and a lock created just before cancellation expires on its own.
pub struct StoreLock<'a, S: ?Sized> {
    store: &'a S,
    key: LockKey,
    token: String,
    options: LockOptions,
}

impl<'a, S> StoreLock<'a, S>
where
    S: KeyValueStore + ?Sized,
{
    pub fn new(store: &'a S, key: LockKey, options: LockOptions) -> Self {
        Self {
            store,
            key,
            token: Uuid::new_v4().to_string(),
            options,
        }
    }

    pub fn key(&self) -> &LockKey {
        &self.key
    }

    /// Block until the lock is held.
    ///
    /// Contention turns into waiting with a fixed backoff for up to
    /// `max_wait`. A store failure returns immediately.
    pub async fn lock(&self) -> Result<(), LockError> {
        let started = Instant::now();
        let mut attempts: u64 = 0;

        loop {
            attempts += 1;
            let created = self
                .store
                .create_if_absent(self.key.as_str(), &self.token, self.options.ttl)
                .await
                .map_err(LockError::Unavailable)?;

            if created {
                if attempts > 1 {
                    counter!(METRIC_LOCK_WAIT).increment(1);
                    debug!(
                        key = %self.key,
                        attempts,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "Acquired contended lock"
                    );
                }
                return Ok(());
            }

            let waited = started.elapsed();
            if waited >= self.options.max_wait {
                return Err(LockError::TimedOut {
                    key: self.key.to_string(),
                    waited,
                });
            }
            sleep(self.options.retry_interval).await;
        }
    }

    /// Release the lock, best-effort.
    ///
    /// The key is deleted only while it still carries this lock's token, so a
    /// holder whose TTL lapsed mid-fill leaves its successor's lock alone. The
    /// check and the delete are separate store calls; a takeover landing
    /// between them is still released.
    ///
    /// Returns `false` when every attempt failed and the lock was left to
    /// expire through its TTL.
    pub async fn unlock(&self) -> bool {
        for attempt in 1..=self.options.unlock_attempts.max(1) {
            match self.release_once().await {
                Ok(()) => return true,
                Err(err) => {
                    warn!(
                        key = %self.key,
                        attempt,
                        error = %err,
                        "Failed to release lock"
                    );
                }
            }
        }

        counter!(METRIC_LOCK_ABANDONED).increment(1);
        warn!(
            key = %self.key,
            ttl_ms = self.options.ttl.as_millis() as u64,
            result = "abandoned",
            "Leaving lock to expire through its ttl"
        );
        false
    }

    async fn release_once(&self) -> Result<(), KvError> {
        match self.store.get(self.key.as_str()).await? {
            Some(holder) if holder == self.token => {
                self.store.delete(self.key.as_str()).await?;
            }
            Some(_) => {
                debug!(
                    key = %self.key,
                    result = "skipped",
                    "Lock expired and was taken by another holder"
                );
            }
            None => {
                debug!(key = %self.key, result = "skipped", "Lock already expired");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::{InMemoryKeyValueStore, Operation};

    fn options() -> LockOptions {
        LockOptions {
            ttl: Duration::from_secs(1),
            retry_interval: Duration::from_millis(10),
            max_wait: Duration::from_secs(30),
            unlock_attempts: 3,
        }
    }

    fn key() -> LockKey {
        LockKey::new("test", "product", 42)
    }

    #[tokio::test(start_paused = true)]
    async fn second_locker_waits_for_unlock() {
        let store = InMemoryKeyValueStore::new();
        let first = StoreLock::new(&store, key(), options());
        let second = StoreLock::new(&store, key(), options());

        first.lock().await.expect("first lock");
        let started = Instant::now();

        let (acquired, released) = tokio::join!(second.lock(), async {
            sleep(Duration::from_millis(200)).await;
            first.unlock().await
        });

        assert!(released);
        acquired.expect("second lock after release");
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(200));
        assert!(waited < options().ttl);
    }

    #[tokio::test(start_paused = true)]
    async fn second_locker_acquires_after_ttl_when_never_unlocked() {
        let store = InMemoryKeyValueStore::new();
        let first = StoreLock::new(&store, key(), options());
        let second = StoreLock::new(&store, key(), options());

        first.lock().await.expect("first lock");
        let started = Instant::now();
        second.lock().await.expect("second lock after ttl");

        assert!(started.elapsed() >= options().ttl);
    }

    #[tokio::test(start_paused = true)]
    async fn contention_beyond_wait_budget_times_out() {
        let store = InMemoryKeyValueStore::new();
        let short = LockOptions {
            ttl: Duration::from_secs(60),
            max_wait: Duration::from_millis(100),
            ..options()
        };
        let holder = StoreLock::new(&store, key(), short);
        let waiter = StoreLock::new(&store, key(), short);

        holder.lock().await.expect("holder lock");
        let err = waiter.lock().await.expect_err("waiter should give up");
        assert!(matches!(err, LockError::TimedOut { .. }));
    }

    #[tokio::test]
    async fn store_failure_is_reported_as_unavailable() {
        let store = InMemoryKeyValueStore::new();
        store.fail_next(Operation::CreateIfAbsent, 1);

        let lock = StoreLock::new(&store, key(), options());
        let err = lock.lock().await.expect_err("lock store is down");
        assert!(matches!(err, LockError::Unavailable(_)));
        assert_eq!(store.calls(Operation::CreateIfAbsent), 1);
    }

    #[tokio::test]
    async fn unlock_retries_transient_failures() {
        let store = InMemoryKeyValueStore::new();
        let lock = StoreLock::new(&store, key(), options());
        lock.lock().await.expect("lock");

        store.fail_next(Operation::Delete, 2);
        assert!(lock.unlock().await);
        assert_eq!(store.calls(Operation::Delete), 3);
        assert!(!store.contains(key().as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn unlock_abandons_to_ttl_after_exhausting_attempts() {
        let store = InMemoryKeyValueStore::new();
        let lock = StoreLock::new(&store, key(), options());
        lock.lock().await.expect("lock");

        store.fail_next(Operation::Delete, 3);
        assert!(!lock.unlock().await);
        assert!(store.contains(key().as_str()));

        sleep(options().ttl).await;
        assert!(!store.contains(key().as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_a_waiting_lock_call_leaves_the_holder_intact() {
        let store = InMemoryKeyValueStore::new();
        let holder = StoreLock::new(&store, key(), options());
        let waiter = StoreLock::new(&store, key(), options());
        holder.lock().await.expect("holder lock");

        let outcome = tokio::time::timeout(Duration::from_millis(100), waiter.lock()).await;
        assert!(outcome.is_err(), "contended lock should still be waiting");
        assert_eq!(store.len(), 1);
        assert_eq!(store.peek(key().as_str()), Some(holder.token.clone()));

        assert!(holder.unlock().await);
        assert!(store.is_empty());

        let started = Instant::now();
        StoreLock::new(&store, key(), options())
            .lock()
            .await
            .expect("free lock");
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_holder_does_not_release_its_successor() {
        let store = InMemoryKeyValueStore::new();
        let first = StoreLock::new(&store, key(), options());
        let second = StoreLock::new(&store, key(), options());

        first.lock().await.expect("first lock");
        sleep(options().ttl).await;
        second.lock().await.expect("second lock after ttl");

        assert!(first.unlock().await);
        assert_eq!(store.peek(key().as_str()), Some(second.token.clone()));
        assert_eq!(store.calls(Operation::Delete), 0);

        assert!(second.unlock().await);
        assert!(!store.contains(key().as_str()));
    }

    #[tokio::test]
    async fn unlock_after_expiry_is_a_no_op() {
        let store = InMemoryKeyValueStore::new();
        let lock = StoreLock::new(&store, key(), options());

        assert!(lock.unlock().await);
        assert_eq!(store.calls(Operation::Delete), 0);
    }

    #[tokio::test]
    async fn unlock_retries_failed_ownership_checks() {
        let store = InMemoryKeyValueStore::new();
        let lock = StoreLock::new(&store, key(), options());
        lock.lock().await.expect("lock");

        store.fail_next(Operation::Get, 1);
        assert!(lock.unlock().await);
        assert_eq!(store.calls(Operation::Get), 2);
        assert!(!store.contains(key().as_str()));
    }
}
