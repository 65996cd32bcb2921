//! Error types for keeper-signer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignerError {
    /// No signer became idle within the acquisition deadline.
    #[error("Signer pool exhausted: no idle signer within {0:?}")]
    PoolExhaustedTimeout(std::time::Duration),

    /// The pool was dropped while waiting for a signer.
    #[error("Signer pool closed")]
    PoolClosed,

    /// Nonce re-sync from the chain failed while preparing a lease.
    #[error("Nonce sync failed for {address}: {reason}")]
    NonceSync { address: String, reason: String },

    /// Mnemonic parsing or key derivation failed.
    #[error("Signer derivation failed: {0}")]
    Derivation(String),
}

pub type SignerResult<T> = Result<T, SignerError>;
