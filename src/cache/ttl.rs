//! Expiration policy for cached blobs and tombstones.

use std::time::Duration;

use rand::Rng;

/// TTLs written by the guard.
///
/// Populated entries get `expire` plus a uniformly random offset in
/// `[0, jitter]` so entries filled together do not expire together.
/// Tombstones get the shorter `expire_not_found`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirationPolicy {
    pub expire: Duration,
    pub expire_not_found: Duration,
    pub jitter: Duration,
}

impl ExpirationPolicy {
    /// TTL for a freshly filled record, jittered with the thread-local RNG.
    pub fn populated_ttl(&self) -> Duration {
        self.populated_ttl_with(&mut rand::rng())
    }

    /// TTL for a freshly filled record using the supplied RNG.
    pub fn populated_ttl_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            return self.expire;
        }
        self.expire
            .saturating_add(Duration::from_millis(rng.random_range(0..=jitter_ms)))
    }

    pub fn tombstone_ttl(&self) -> Duration {
        self.expire_not_found
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 3600);

    fn policy(jitter: Duration) -> ExpirationPolicy {
        ExpirationPolicy {
            expire: DAY * 365,
            expire_not_found: DAY,
            jitter,
        }
    }

    #[test]
    fn populated_ttl_stays_within_jitter_window() {
        let policy = policy(DAY);
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..1_000 {
            let ttl = policy.populated_ttl_with(&mut rng);
            assert!(ttl >= policy.expire);
            assert!(ttl <= policy.expire + policy.jitter);
        }
    }

    #[test]
    fn populated_ttls_are_decorrelated() {
        let policy = policy(DAY);
        let mut rng = StdRng::seed_from_u64(11);

        let ttls: HashSet<Duration> = (0..200)
            .map(|_| policy.populated_ttl_with(&mut rng))
            .collect();

        // 200 draws over ~86.4M milliseconds should essentially never repeat.
        assert!(ttls.len() > 190, "only {} distinct ttls", ttls.len());
        let min = ttls.iter().min().copied().expect("non-empty");
        let max = ttls.iter().max().copied().expect("non-empty");
        assert!(max - min > Duration::from_secs(3600));
    }

    #[test]
    fn zero_jitter_yields_base_expiry() {
        let policy = policy(Duration::ZERO);
        assert_eq!(policy.populated_ttl(), policy.expire);
    }

    #[test]
    fn tombstone_uses_short_expiry() {
        let policy = policy(DAY);
        assert_eq!(policy.tombstone_ttl(), DAY);
        assert!(policy.tombstone_ttl() < policy.populated_ttl());
    }
}
