//! Signer pool for the perps keeper.
//!
//! Guarantees at-most-one in-flight transaction per signing key while
//! parallelising across keys: acquisition is FIFO-fair and scoped, the
//! lease spans the whole task including the confirmation wait, and nonces
//! advance strictly monotonically per key.

pub mod derive;
pub mod error;
pub mod pool;

pub use derive::{build_wallet, derive_signers};
pub use error::{SignerError, SignerResult};
pub use pool::{SignerHandle, SignerPool, SignerPoolConfig};
