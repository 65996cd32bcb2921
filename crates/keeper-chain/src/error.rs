//! Error types for keeper-chain.

use alloy::primitives::B256;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    /// Transport-level RPC failure (timeout, rate limit, 5xx). Retryable.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// The queried block is not available from the provider yet.
    #[error("Block {0} not available")]
    BlockNotAvailable(u64),

    #[error("Log decode error: {0}")]
    Decode(String),

    /// A range scan exhausted its retry budget.
    #[error("Event scan of [{from_block}, {to_block}] failed: {reason}")]
    EventScanFailed {
        from_block: u64,
        to_block: u64,
        reason: String,
    },

    #[error("Transaction {0} reverted")]
    Reverted(B256),

    #[error("Timed out waiting for confirmation of {0}")]
    ConfirmationTimeout(B256),

    #[error(transparent)]
    Value(#[from] keeper_core::CoreError),

    /// The awaiting task was cancelled by shutdown.
    #[error("Cancelled")]
    Cancelled,
}

impl ChainError {
    /// Whether a retry with backoff is worthwhile.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChainError::Rpc(_) | ChainError::BlockNotAvailable(_)
        )
    }
}

pub type ChainResult<T> = Result<T, ChainError>;
