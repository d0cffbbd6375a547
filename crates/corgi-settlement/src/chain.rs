//! Chain client seam.
//!
//! The settlement engine only needs two calls: broadcast a transfer from the
//! bank wallet and ask whether a hash has landed. Implementations must make
//! `send_transaction` safe to call again for the same logical transfer; the
//! engine guarantees a completed row is never re-broadcast.

use async_trait::async_trait;
use corgi_retry::Retryable;
use corgi_types::TokenAmount;
use serde::{Deserialize, Serialize};

/// Failure talking to the chain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("chain request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("chain endpoint returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("invalid destination address: {0}")]
    InvalidAddress(String),

    #[error("malformed chain response: {0}")]
    Malformed(String),
}

impl Retryable for ChainError {
    fn is_retryable(&self) -> bool {
        match self {
            ChainError::Timeout | ChainError::Network(_) => true,
            ChainError::Http { status, .. } => *status >= 500,
            ChainError::Rejected(_) | ChainError::InvalidAddress(_) | ChainError::Malformed(_) => {
                false
            }
        }
    }
}

/// Acknowledgement of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub hash: String,
}

/// On-chain state of a previously broadcast transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainTxStatus {
    Pending,
    Confirmed,
    Failed,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Broadcast a transfer of `amount` base units from the bank wallet.
    async fn send_transaction(
        &self,
        to: &str,
        amount: TokenAmount,
        memo: Option<&str>,
    ) -> Result<TxReceipt, ChainError>;

    async fn get_transaction_status(&self, hash: &str) -> Result<ChainTxStatus, ChainError>;
}
