//! Change notifications from upstream writers.
//!
//! An upstream consumer (queue subscriber, admin hook) hands each
//! notification to [`apply_change`], which maps it onto the guard's write
//! paths. Retries belong to the upstream delivery mechanism.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::application::repos::RecordStore;
use crate::domain::Entity;

use super::config::GuardConfig;
use super::error::GuardError;
use super::guard::{CacheGuard, evict};
use super::store::KeyValueStore;

/// A create/update/delete notification for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// The record was created or updated.
    #[serde(alias = "created", alias = "updated")]
    Upserted { id: i64 },
    /// The record was deleted.
    Deleted { id: i64 },
}

impl ChangeEvent {
    pub fn id(&self) -> i64 {
        match self {
            ChangeEvent::Upserted { id } | ChangeEvent::Deleted { id } => *id,
        }
    }
}

/// Propagate one change notification into the cache.
///
/// Upserts refresh the entry and report failures so the notification can be
/// redelivered. Deletes go through [`apply_deletion`].
pub async fn apply_change<S, R>(
    event: &ChangeEvent,
    cache: &S,
    records: &R,
    config: &GuardConfig,
) -> Result<(), GuardError>
where
    S: KeyValueStore + ?Sized,
    R: RecordStore + ?Sized,
{
    match event {
        ChangeEvent::Upserted { id } => {
            let guard = CacheGuard::new(*id, cache, records, config);
            guard.refresh().await?;
            info!(key = %guard.cache_key(), "Applied upsert notification");
            Ok(())
        }
        ChangeEvent::Deleted { id } => {
            apply_deletion::<R::Record, S>(*id, cache, config).await;
            Ok(())
        }
    }
}

/// Evict the entry of a deleted record; needs no record store.
///
/// Failures are logged and swallowed: the stale entry expires on its own.
pub async fn apply_deletion<E, S>(id: i64, cache: &S, config: &GuardConfig)
where
    E: Entity,
    S: KeyValueStore + ?Sized,
{
    match evict::<E, S>(id, cache, config).await {
        Ok(removed) => {
            info!(entity = E::NAME, id, removed, "Applied delete notification");
        }
        Err(err) => {
            warn!(
                entity = E::NAME,
                id,
                error = %err,
                result = "ignored",
                "Cache delete failed; entry will expire through its ttl"
            );
        }
    }
}
