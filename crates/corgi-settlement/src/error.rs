//! Settlement error taxonomy.
//!
//! Every error carries an [`ErrorKind`] discriminant. Callers match on the
//! kind, never on message text.

use corgi_db::DbError;
use corgi_retry::Retryable;
use corgi_reward::RewardError;
use corgi_types::{TokenAmount, ValidationError};
use serde::Serialize;

use crate::chain::ChainError;

/// How a caller should treat an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input or a business rule refused the request. Never retried.
    Validation,
    /// A referenced row does not exist.
    NotFound,
    /// The mutation collides with current state. Re-fetch, do not repeat blindly.
    Conflict,
    /// Chain infrastructure failed after the retry budget was spent.
    Transient,
    /// Anything else. Logged in full, reported generically.
    Internal,
}

/// Error types for settlement and the services around it.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("not permitted: {0}")]
    NotPermitted(String),

    #[error("user {0} has no connected wallet")]
    WalletRequired(corgi_types::Id),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("bank balance too low: need {required}, have {available}")]
    InsufficientBalance {
        required: TokenAmount,
        available: TokenAmount,
    },

    #[error("chain call failed after {attempts} attempt(s): {source}")]
    Chain { source: ChainError, attempts: u32 },

    #[error(transparent)]
    Reward(#[from] RewardError),

    #[error("database error: {0}")]
    Db(#[from] DbError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SettlementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SettlementError::Validation(_)
            | SettlementError::NotPermitted(_)
            | SettlementError::WalletRequired(_) => ErrorKind::Validation,
            SettlementError::Reward(RewardError::Invalid(_)) => ErrorKind::Validation,
            SettlementError::Reward(_) => ErrorKind::Internal,
            SettlementError::NotFound(_) => ErrorKind::NotFound,
            SettlementError::Conflict(_) | SettlementError::InsufficientBalance { .. } => {
                ErrorKind::Conflict
            }
            SettlementError::Chain { source, .. } => {
                if source.is_retryable() {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Internal
                }
            }
            SettlementError::Db(DbError::NotFound(_)) => ErrorKind::NotFound,
            SettlementError::Db(DbError::Constraint(_)) => ErrorKind::Conflict,
            SettlementError::Db(_) | SettlementError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<rusqlite::Error> for SettlementError {
    fn from(err: rusqlite::Error) -> Self {
        SettlementError::Db(DbError::from(err))
    }
}

/// Convenience result type for settlement operations.
pub type Result<T> = std::result::Result<T, SettlementError>;
