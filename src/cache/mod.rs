//! Productguard cache layer.
//!
//! Guards a record store behind a shared key/value cache:
//!
//! - **Stampede**: concurrent misses for one identifier serialize on a
//!   store-backed lock, so only the first reaches the record store.
//! - **Penetration**: confirmed-absent records are cached as a tombstone with
//!   a short TTL.
//! - **Avalanche**: populated entries get a base TTL plus random jitter.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! namespace = "openapi"
//! expire_seconds = 31536000
//! expire_not_found_seconds = 86400
//! # ... see config.rs for all options
//! ```

mod config;
mod error;
mod events;
mod guard;
mod keys;
mod lock;
mod memory;
mod store;
mod ttl;

pub use config::GuardConfig;
pub use error::{GuardError, StoreError};
pub use events::{ChangeEvent, apply_change, apply_deletion};
pub use guard::{CacheGuard, evict};
pub use keys::{CacheKey, LockKey, TOMBSTONE};
pub use lock::{LockError, LockOptions, StoreLock};
pub use memory::{InMemoryKeyValueStore, Operation};
pub use store::{KeyValueStore, KvError};
pub use ttl::ExpirationPolicy;
