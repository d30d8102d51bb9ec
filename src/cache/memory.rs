//! In-process [`KeyValueStore`] honouring TTLs.
//!
//! Backs the test suites. Expiry is measured with the
//! tokio clock, so paused-time tests can advance past TTLs. Calls can be made
//! to fail on demand to exercise infrastructure-error paths.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use super::store::{KeyValueStore, KvError};

/// Store operation, used to target injected failures and read call counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Get,
    Set,
    CreateIfAbsent,
    Delete,
}

impl Operation {
    const COUNT: usize = 4;

    fn index(self) -> usize {
        match self {
            Operation::Get => 0,
            Operation::Set => 1,
            Operation::CreateIfAbsent => 2,
            Operation::Delete => 3,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: Instant,
}

impl Slot {
    fn new(value: &str, ttl: Duration) -> Self {
        Self {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Default)]
pub struct InMemoryKeyValueStore {
    entries: DashMap<String, Slot>,
    pending_failures: [AtomicUsize; Operation::COUNT],
    calls: [AtomicUsize; Operation::COUNT],
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` calls of `op` fail with [`KvError::Unavailable`].
    pub fn fail_next(&self, op: Operation, times: usize) {
        self.pending_failures[op.index()].store(times, Ordering::SeqCst);
    }

    /// Number of calls of `op` made so far, failed ones included.
    pub fn calls(&self, op: Operation) -> usize {
        self.calls[op.index()].load(Ordering::SeqCst)
    }

    /// Whether a live (unexpired) entry exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.peek(key).is_some()
    }

    /// Live value for `key` without counting a call.
    pub fn peek(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.entries
            .get(key)
            .and_then(|slot| slot.is_live(now).then(|| slot.value.clone()))
    }

    /// Remaining time to live of `key`, if present.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .and_then(|slot| slot.is_live(now).then(|| slot.expires_at - now))
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|slot| slot.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn begin(&self, op: Operation) -> Result<(), KvError> {
        self.calls[op.index()].fetch_add(1, Ordering::SeqCst);
        let injected = self.pending_failures[op.index()]
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(KvError::unavailable(format!("injected {op:?} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.begin(Operation::Get)?;
        let now = Instant::now();
        let found = self
            .entries
            .get(key)
            .map(|slot| slot.is_live(now).then(|| slot.value.clone()));

        match found {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                self.entries.remove_if(key, |_, slot| !slot.is_live(now));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        self.begin(Operation::Set)?;
        self.entries.insert(key.to_string(), Slot::new(value, ttl));
        Ok(())
    }

    async fn create_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, KvError> {
        self.begin(Operation::CreateIfAbsent)?;
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    return Ok(false);
                }
                occupied.insert(Slot::new(value, ttl));
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::new(value, ttl));
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        self.begin(Operation::Delete)?;
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, slot)| slot.is_live(now)))
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::sleep;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let store = InMemoryKeyValueStore::new();
        store
            .set("k", "v", Duration::from_secs(5))
            .await
            .expect("set");

        assert_eq!(store.get("k").await.expect("get"), Some("v".to_string()));
        assert_eq!(store.ttl("k"), Some(Duration::from_secs(5)));

        sleep(Duration::from_secs(5)).await;
        assert_eq!(store.get("k").await.expect("get"), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn create_if_absent_respects_live_and_expired_entries() {
        let store = InMemoryKeyValueStore::new();
        let ttl = Duration::from_secs(1);

        assert!(store.create_if_absent("lock", "a", ttl).await.expect("create"));
        assert!(!store.create_if_absent("lock", "b", ttl).await.expect("create"));
        assert_eq!(store.peek("lock"), Some("a".to_string()));

        sleep(ttl).await;
        assert!(store.create_if_absent("lock", "c", ttl).await.expect("create"));
        assert_eq!(store.peek("lock"), Some("c".to_string()));
    }

    #[tokio::test]
    async fn delete_reports_whether_a_live_key_was_removed() {
        let store = InMemoryKeyValueStore::new();
        assert!(!store.delete("missing").await.expect("delete"));

        store
            .set("k", "v", Duration::from_secs(60))
            .await
            .expect("set");
        assert!(store.delete("k").await.expect("delete"));
        assert!(!store.contains("k"));
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let store = InMemoryKeyValueStore::new();
        store.fail_next(Operation::Get, 2);

        assert!(store.get("k").await.is_err());
        assert!(store.get("k").await.is_err());
        assert_eq!(store.get("k").await.expect("third get succeeds"), None);
        assert_eq!(store.calls(Operation::Get), 3);
        assert_eq!(store.calls(Operation::Set), 0);
    }
}
