//! Chain access for the perps keeper.
//!
//! The engine depends only on the capability traits in this crate:
//! [`ChainClient`] (block/event/balance primitives), [`MarketContract`]
//! (the per-market read/write surface), [`Multicall`] and [`PythContract`].
//! The [`rpc`] module provides the alloy-backed implementations used by the
//! binary; tests substitute hand-rolled mocks.

pub mod abi;
pub mod client;
pub mod contract;
pub mod error;
pub mod multicall;
pub mod rpc;
pub mod source;

pub use client::{BlockInfo, BoxFuture, ChainClient};
pub use contract::{
    MarketCall, MarketContract, MarketDirectory, MarketSummary, OnchainDelayedOrder, PendingTx,
    PythContract, TxOptions, TxOutcome,
};
pub use error::{ChainError, ChainResult};
pub use multicall::{Call3, Call3Result, Multicall};
pub use source::{EventSource, EventSourceConfig};
