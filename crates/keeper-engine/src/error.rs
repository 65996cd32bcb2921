//! Error types for keeper-engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Chain(#[from] keeper_chain::ChainError),

    #[error(transparent)]
    Signer(#[from] keeper_signer::SignerError),

    #[error(transparent)]
    Pyth(#[from] keeper_pyth::PythError),

    #[error("Market {0} has no off-chain price feed configured")]
    MissingPriceFeed(String),

    #[error("Hydration failed: {0}")]
    Hydration(String),
}

impl EngineError {
    /// Soft errors do not consume an item's failure budget; the item is
    /// simply retried next tick.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            EngineError::Signer(keeper_signer::SignerError::PoolExhaustedTimeout(_))
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
