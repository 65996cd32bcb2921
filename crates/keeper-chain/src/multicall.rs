//! Multicall3 capability.

use alloy::primitives::{Address, Bytes};

use crate::client::BoxFuture;
use crate::contract::{PendingTx, TxOptions};
use crate::error::ChainResult;

/// One `aggregate3` sub-call.
#[derive(Debug, Clone)]
pub struct Call3 {
    pub target: Address,
    pub allow_failure: bool,
    pub calldata: Bytes,
}

/// Per-sub-call result of an `aggregate3` dry-run.
#[derive(Debug, Clone)]
pub struct Call3Result {
    pub success: bool,
    pub return_data: Bytes,
}

/// Multicall3 `aggregate3`, used to dry-run and batch flag submissions.
pub trait Multicall: Send + Sync {
    /// `eth_call` the batch with `allow_failure = true` to discover which
    /// sub-calls the contracts would accept.
    fn dry_run(&self, calls: Vec<Call3>) -> BoxFuture<'_, ChainResult<Vec<Call3Result>>>;

    /// `eth_estimateGas` for the batch transaction.
    fn estimate_gas(&self, calls: Vec<Call3>) -> BoxFuture<'_, ChainResult<u64>>;

    /// Submit the batch as one transaction.
    fn submit(&self, calls: Vec<Call3>, opts: TxOptions) -> BoxFuture<'_, ChainResult<PendingTx>>;
}
