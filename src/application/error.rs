use thiserror::Error;

use crate::{cache::GuardError, infra::error::InfraError};

/// Top-level error surfaced by the binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Guard(#[from] GuardError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code for this error.
    ///
    /// A confirmed-absent record is distinguishable from an outage so scripts
    /// can branch on it.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Guard(GuardError::NotFound { .. }) => 2,
            AppError::Guard(GuardError::StoreUnavailable(_)) => 3,
            AppError::Validation(_) => 64,
            AppError::Infra(_) | AppError::Unexpected(_) => 1,
        }
    }
}
