//! The chain-client capability trait.

use std::future::Future;
use std::pin::Pin;

use alloy::primitives::{Address, U256};
use keeper_core::{ChainEvent, EventKind};

use crate::error::ChainResult;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A block header subset the keeper cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub number: u64,
    pub timestamp: u64,
}

/// Read primitives against the chain.
///
/// Shared read-only across keepers; implementations must be safe for
/// concurrent calls. Transient failures are retried inside the
/// implementation up to its budget and surface as `ChainError::Rpc`.
pub trait ChainClient: Send + Sync {
    /// Current tip height.
    fn block_number(&self) -> BoxFuture<'_, ChainResult<u64>>;

    /// Header of a specific block.
    fn block(&self, number: u64) -> BoxFuture<'_, ChainResult<BlockInfo>>;

    /// Header of the latest block.
    fn latest_block(&self) -> BoxFuture<'_, ChainResult<BlockInfo>>;

    /// Current gas price in wei.
    fn gas_price(&self) -> BoxFuture<'_, ChainResult<u128>>;

    /// Confirmed transaction count (the next nonce) for an account.
    fn transaction_count(&self, account: Address) -> BoxFuture<'_, ChainResult<u64>>;

    /// ETH balance of an account.
    fn balance(&self, account: Address) -> BoxFuture<'_, ChainResult<U256>>;

    /// Decoded events emitted by `contract` in `[from_block, to_block]`,
    /// restricted to `kinds`. One underlying query; the caller (the
    /// [`crate::EventSource`]) handles paging, retries and ordering.
    fn get_events<'a>(
        &'a self,
        contract: Address,
        kinds: &'a [EventKind],
        from_block: u64,
        to_block: u64,
    ) -> BoxFuture<'a, ChainResult<Vec<ChainEvent>>>;
}
