//! Market-contract capability traits and transaction plumbing.

use alloy::primitives::{Address, Bytes, B256, U256};
use keeper_core::MarketKey;
use rust_decimal::Decimal;

use crate::client::BoxFuture;
use crate::error::ChainResult;

/// The state-changing calls a keeper may submit to a market.
#[derive(Debug, Clone)]
pub enum MarketCall {
    ExecuteDelayedOrder(Address),
    ExecuteOffchainDelayedOrder(Address, Vec<Bytes>),
    FlagPosition(Address),
    LiquidatePosition(Address),
}

impl MarketCall {
    /// The account a call acts on, for logging.
    pub fn account(&self) -> Address {
        match self {
            MarketCall::ExecuteDelayedOrder(a)
            | MarketCall::ExecuteOffchainDelayedOrder(a, _)
            | MarketCall::FlagPosition(a)
            | MarketCall::LiquidatePosition(a) => *a,
        }
    }
}

/// Submission parameters decided by the caller.
///
/// `from` and `nonce` come from the signer lease; gas fields carry the
/// headroom-adjusted values; `value` is nonzero only for Pyth-fee calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOptions {
    pub from: Address,
    pub nonce: u64,
    pub gas_limit: Option<u64>,
    pub gas_price: Option<u128>,
    pub value: U256,
}

impl TxOptions {
    pub fn new(from: Address, nonce: u64) -> Self {
        Self {
            from,
            nonce,
            gas_limit: None,
            gas_price: None,
            value: U256::ZERO,
        }
    }

    pub fn gas_limit(mut self, limit: u64) -> Self {
        self.gas_limit = Some(limit);
        self
    }

    pub fn gas_price(mut self, price: u128) -> Self {
        self.gas_price = Some(price);
        self
    }

    pub fn value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// Confirmed-transaction outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOutcome {
    pub hash: B256,
    pub block_number: u64,
    pub success: bool,
}

/// A submitted transaction whose confirmation can be awaited once.
pub struct PendingTx {
    hash: B256,
    confirmed: BoxFuture<'static, ChainResult<TxOutcome>>,
}

impl PendingTx {
    pub fn new(hash: B256, confirmed: BoxFuture<'static, ChainResult<TxOutcome>>) -> Self {
        Self { hash, confirmed }
    }

    pub fn hash(&self) -> B256 {
        self.hash
    }

    /// Wait for one confirmation.
    pub async fn confirmed(self) -> ChainResult<TxOutcome> {
        self.confirmed.await
    }
}

impl std::fmt::Debug for PendingTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTx").field("hash", &self.hash).finish()
    }
}

/// A delayed order as read back from the contract before submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnchainDelayedOrder {
    /// Zero when the order no longer exists.
    pub size_delta_is_zero: bool,
    pub target_round_id: u64,
    pub executable_at_time: u64,
    pub intention_time: u64,
}

/// One entry of `allMarketSummaries`.
#[derive(Debug, Clone)]
pub struct MarketSummary {
    pub address: Address,
    pub asset: String,
    pub key: MarketKey,
    pub price: Decimal,
}

/// Per-market contract surface, by capability.
///
/// Implementations are the only place that knows the ABI; everything the
/// engine sees is typed. Read methods retry transient failures internally.
pub trait MarketContract: Send + Sync {
    fn address(&self) -> Address;

    fn market_key(&self) -> &MarketKey;

    /// Current oracle round for the market's asset.
    fn current_round_id(&self) -> BoxFuture<'_, ChainResult<u64>>;

    /// Current asset price in natural units.
    fn asset_price(&self) -> BoxFuture<'_, ChainResult<Decimal>>;

    /// Pyth feed id used by the off-chain execution path.
    fn offchain_price_feed_id(&self) -> BoxFuture<'_, ChainResult<B256>>;

    /// Re-read an account's delayed order.
    fn delayed_order(&self, account: Address) -> BoxFuture<'_, ChainResult<OnchainDelayedOrder>>;

    fn can_liquidate(&self, account: Address) -> BoxFuture<'_, ChainResult<bool>>;

    fn is_flagged(&self, account: Address) -> BoxFuture<'_, ChainResult<bool>>;

    /// The price at which the account's position becomes liquidatable.
    fn liquidation_price(&self, account: Address) -> BoxFuture<'_, ChainResult<Decimal>>;

    /// `eth_estimateGas` for a call, without headroom.
    fn estimate_gas(&self, call: &MarketCall) -> BoxFuture<'_, ChainResult<u64>>;

    /// Sign and submit a call with the given options.
    fn submit(&self, call: MarketCall, opts: TxOptions) -> BoxFuture<'_, ChainResult<PendingTx>>;

    /// ABI-encode a call for multicall batching.
    fn encode_call(&self, call: &MarketCall) -> Bytes;
}

/// The market directory contract (`allMarketSummaries`).
pub trait MarketDirectory: Send + Sync {
    fn all_market_summaries(&self) -> BoxFuture<'_, ChainResult<Vec<MarketSummary>>>;
}

/// The on-chain Pyth contract (`getUpdateFee`).
pub trait PythContract: Send + Sync {
    fn update_fee<'a>(&'a self, update_data: &'a [Bytes]) -> BoxFuture<'a, ChainResult<U256>>;
}
