//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::Entity;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("database timeout")]
    Timeout,
    #[error("invalid record: {message}")]
    InvalidRecord { message: String },
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }
}

/// Durable point-lookup store sitting behind the cache.
///
/// `Ok(None)` is an authoritative "no such record"; any `Err` is an
/// infrastructure failure and says nothing about existence.
#[async_trait]
pub trait RecordStore: Send + Sync {
    type Record: Entity + Serialize + Send + Sync;

    async fn get_by_identifier(&self, id: i64) -> Result<Option<Self::Record>, RepoError>;
}
