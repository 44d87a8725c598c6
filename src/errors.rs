//! Error types shared across the crate.

use crate::account::AccountId;

/// Errors raised while resolving, evaluating or persisting accounts.
///
/// `AlreadyConfirmed`, `AlreadyBlocked` and `NotYetEligible` are ordinary
/// outcomes (see [`crate::blocker::Outcome`]) and never show up here.
#[derive(Debug, thiserror::Error)]
pub enum BlockerError {
    #[error("account {0} not found")]
    NotFound(AccountId),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("observer error: {0}")]
    ObserverError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("output error: {0}")]
    OutputError(#[from] std::io::Error),
}

pub type BlockerResult<T> = Result<T, BlockerError>;
