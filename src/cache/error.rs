use thiserror::Error;

use crate::application::repos::RepoError;

use super::store::KvError;

/// Infrastructure failure behind a [`GuardError::StoreUnavailable`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache store: {0}")]
    Cache(#[from] KvError),
    #[error("record store: {0}")]
    Records(#[from] RepoError),
    #[error("record could not be encoded for the cache: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure visible to callers of the guard.
///
/// `NotFound` is authoritative: the record store confirmed absence.
/// `StoreUnavailable` says nothing about whether the record exists.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl GuardError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GuardError::NotFound { .. })
    }
}

impl From<KvError> for GuardError {
    fn from(err: KvError) -> Self {
        Self::StoreUnavailable(StoreError::Cache(err))
    }
}

impl From<RepoError> for GuardError {
    fn from(err: RepoError) -> Self {
        Self::StoreUnavailable(StoreError::Records(err))
    }
}

impl From<serde_json::Error> for GuardError {
    fn from(err: serde_json::Error) -> Self {
        Self::StoreUnavailable(StoreError::Encode(err))
    }
}
