//! Shared mocks for engine tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use keeper_chain::{
    BlockInfo, BoxFuture, Call3, Call3Result, ChainClient, ChainError, ChainResult, MarketCall,
    MarketContract, Multicall, OnchainDelayedOrder, PendingTx, PythContract, TxOptions, TxOutcome,
};
use keeper_core::{ChainEvent, EventKind, EventPayload, MarketKey};
use keeper_pyth::{PriceService, PythResult};
use keeper_signer::{SignerPool, SignerPoolConfig};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::keeper::KeeperDeps;
use crate::notifier::LogNotifier;

pub fn block_at(number: u64, timestamp: u64) -> BlockInfo {
    BlockInfo { number, timestamp }
}

pub fn event_at(block: u64, index: u64, payload: EventPayload) -> ChainEvent {
    ChainEvent {
        payload,
        block_number: block,
        log_index: index,
        block_timestamp: None,
    }
}

pub fn order_submitted(
    account: Address,
    is_offchain: bool,
    target_round_id: u64,
    intention_time: Option<u64>,
    executable_at_time: u64,
) -> ChainEvent {
    event_at(
        1,
        0,
        EventPayload::DelayedOrderSubmitted {
            account,
            is_offchain,
            size_delta: Decimal::ONE,
            target_round_id,
            intention_time,
            executable_at_time,
        },
    )
}

pub fn removed(account: Address, is_offchain: bool) -> ChainEvent {
    event_at(
        1,
        1,
        EventPayload::DelayedOrderRemoved {
            account,
            is_offchain,
        },
    )
}

pub fn position_modified(
    account: Address,
    size: Decimal,
    margin: Decimal,
    last_price: Decimal,
) -> ChainEvent {
    event_at(
        1,
        0,
        EventPayload::PositionModified {
            id: U256::from(1),
            account,
            size,
            margin,
            last_price,
        },
    )
}

pub fn position_liquidated(account: Address) -> ChainEvent {
    event_at(1, 0, EventPayload::PositionLiquidated { account })
}

pub fn position_flagged(account: Address) -> ChainEvent {
    event_at(1, 0, EventPayload::PositionFlagged { account })
}

pub fn funding_recomputed(timestamp: u64) -> ChainEvent {
    event_at(1, 0, EventPayload::FundingRecomputed { timestamp })
}

fn ok_pending() -> PendingTx {
    let hash = B256::repeat_byte(0x77);
    PendingTx::new(
        hash,
        Box::pin(async move {
            Ok(TxOutcome {
                hash,
                block_number: 1,
                success: true,
            })
        }),
    )
}

// ============================================================================
// FakeChain
// ============================================================================

/// Scriptable chain: settable tip/timestamp, per-contract event feeds,
/// injectable scan failures.
pub struct FakeChain {
    pub tip: AtomicU64,
    pub timestamp: AtomicU64,
    pub gas_price: u128,
    pub events: Mutex<HashMap<Address, Vec<ChainEvent>>>,
    pub failing_contracts: Mutex<HashSet<Address>>,
    pub queried_ranges: Mutex<Vec<(Address, u64, u64)>>,
}

impl Default for FakeChain {
    fn default() -> Self {
        Self {
            tip: AtomicU64::new(1),
            timestamp: AtomicU64::new(900),
            gas_price: 1_000_000,
            events: Mutex::new(HashMap::new()),
            failing_contracts: Mutex::new(HashSet::new()),
            queried_ranges: Mutex::new(Vec::new()),
        }
    }
}

impl FakeChain {
    pub fn push_event(&self, contract: Address, event: ChainEvent) {
        self.events.lock().entry(contract).or_default().push(event);
    }

    pub fn set_tip(&self, tip: u64) {
        self.tip.store(tip, Ordering::SeqCst);
    }

    pub fn set_timestamp(&self, ts: u64) {
        self.timestamp.store(ts, Ordering::SeqCst);
    }

    pub fn fail_scans_for(&self, contract: Address) {
        self.failing_contracts.lock().insert(contract);
    }

    pub fn heal_scans_for(&self, contract: Address) {
        self.failing_contracts.lock().remove(&contract);
    }
}

impl ChainClient for FakeChain {
    fn block_number(&self) -> BoxFuture<'_, ChainResult<u64>> {
        Box::pin(async move { Ok(self.tip.load(Ordering::SeqCst)) })
    }

    fn block(&self, number: u64) -> BoxFuture<'_, ChainResult<BlockInfo>> {
        Box::pin(async move {
            Ok(BlockInfo {
                number,
                timestamp: self.timestamp.load(Ordering::SeqCst),
            })
        })
    }

    fn latest_block(&self) -> BoxFuture<'_, ChainResult<BlockInfo>> {
        Box::pin(async move {
            Ok(BlockInfo {
                number: self.tip.load(Ordering::SeqCst),
                timestamp: self.timestamp.load(Ordering::SeqCst),
            })
        })
    }

    fn gas_price(&self) -> BoxFuture<'_, ChainResult<u128>> {
        Box::pin(async move { Ok(self.gas_price) })
    }

    fn transaction_count(&self, _account: Address) -> BoxFuture<'_, ChainResult<u64>> {
        Box::pin(async { Ok(0) })
    }

    fn balance(&self, _account: Address) -> BoxFuture<'_, ChainResult<U256>> {
        Box::pin(async { Ok(U256::ZERO) })
    }

    fn get_events<'a>(
        &'a self,
        contract: Address,
        _kinds: &'a [EventKind],
        from_block: u64,
        to_block: u64,
    ) -> BoxFuture<'a, ChainResult<Vec<ChainEvent>>> {
        Box::pin(async move {
            self.queried_ranges
                .lock()
                .push((contract, from_block, to_block));
            if self.failing_contracts.lock().contains(&contract) {
                return Err(ChainError::Decode("scripted scan failure".into()));
            }
            Ok(self
                .events
                .lock()
                .get(&contract)
                .map(|events| {
                    events
                        .iter()
                        .filter(|e| e.block_number >= from_block && e.block_number <= to_block)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        })
    }
}

// ============================================================================
// MockMarket
// ============================================================================

struct MockMarketInner {
    key: MarketKey,
    address: Address,
    current_round: AtomicU64,
    asset_price: Mutex<Decimal>,
    delayed_open: Mutex<HashMap<Address, bool>>,
    can_liquidate: Mutex<HashMap<Address, bool>>,
    flagged: Mutex<HashMap<Address, bool>>,
    liq_prices: Mutex<HashMap<Address, Decimal>>,
    fail_submissions: AtomicBool,
    submitted: Mutex<Vec<String>>,
    submission_attempts: AtomicUsize,
    submitted_nonces: Mutex<Vec<u64>>,
}

/// Scriptable market contract; clones share state.
#[derive(Clone)]
pub struct MockMarket {
    inner: Arc<MockMarketInner>,
}

impl MockMarket {
    pub fn new(key: &str) -> Self {
        Self {
            inner: Arc::new(MockMarketInner {
                key: MarketKey::new(key),
                address: Address::repeat_byte(0xEE),
                current_round: AtomicU64::new(0),
                asset_price: Mutex::new(Decimal::ZERO),
                delayed_open: Mutex::new(HashMap::new()),
                can_liquidate: Mutex::new(HashMap::new()),
                flagged: Mutex::new(HashMap::new()),
                liq_prices: Mutex::new(HashMap::new()),
                fail_submissions: AtomicBool::new(false),
                submitted: Mutex::new(Vec::new()),
                submission_attempts: AtomicUsize::new(0),
                submitted_nonces: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn set_current_round(&self, round: u64) {
        self.inner.current_round.store(round, Ordering::SeqCst);
    }

    pub fn set_asset_price(&self, price: Decimal) {
        *self.inner.asset_price.lock() = price;
    }

    pub fn set_delayed_order_open(&self, account: Address, open: bool) {
        self.inner.delayed_open.lock().insert(account, open);
    }

    pub fn set_can_liquidate(&self, account: Address, can: bool) {
        self.inner.can_liquidate.lock().insert(account, can);
    }

    pub fn set_flagged(&self, account: Address, flagged: bool) {
        self.inner.flagged.lock().insert(account, flagged);
    }

    pub fn set_liquidation_price(&self, account: Address, price: Decimal) {
        self.inner.liq_prices.lock().insert(account, price);
    }

    pub fn fail_submissions(&self, fail: bool) {
        self.inner.fail_submissions.store(fail, Ordering::SeqCst);
    }

    /// Names of successfully submitted calls, in submission order.
    pub fn submitted_calls(&self) -> Vec<String> {
        self.inner.submitted.lock().clone()
    }

    pub fn submitted_nonces(&self) -> Vec<u64> {
        self.inner.submitted_nonces.lock().clone()
    }

    pub fn submission_attempts(&self) -> usize {
        self.inner.submission_attempts.load(Ordering::SeqCst)
    }

    fn call_name(call: &MarketCall) -> &'static str {
        match call {
            MarketCall::ExecuteDelayedOrder(_) => "executeDelayedOrder",
            MarketCall::ExecuteOffchainDelayedOrder(_, _) => "executeOffchainDelayedOrder",
            MarketCall::FlagPosition(_) => "flagPosition",
            MarketCall::LiquidatePosition(_) => "liquidatePosition",
        }
    }

    fn call_discriminant(call: &MarketCall) -> u8 {
        match call {
            MarketCall::ExecuteDelayedOrder(_) => 1,
            MarketCall::ExecuteOffchainDelayedOrder(_, _) => 2,
            MarketCall::FlagPosition(_) => 3,
            MarketCall::LiquidatePosition(_) => 4,
        }
    }

    /// Recover the account from a mock-encoded calldata blob.
    pub fn decode_account(calldata: &Bytes) -> Address {
        Address::from_slice(&calldata[1..21])
    }
}

impl MarketContract for MockMarket {
    fn address(&self) -> Address {
        self.inner.address
    }

    fn market_key(&self) -> &MarketKey {
        &self.inner.key
    }

    fn current_round_id(&self) -> BoxFuture<'_, ChainResult<u64>> {
        Box::pin(async move { Ok(self.inner.current_round.load(Ordering::SeqCst)) })
    }

    fn asset_price(&self) -> BoxFuture<'_, ChainResult<Decimal>> {
        Box::pin(async move { Ok(*self.inner.asset_price.lock()) })
    }

    fn offchain_price_feed_id(&self) -> BoxFuture<'_, ChainResult<B256>> {
        Box::pin(async { Ok(B256::repeat_byte(0x42)) })
    }

    fn delayed_order(&self, account: Address) -> BoxFuture<'_, ChainResult<OnchainDelayedOrder>> {
        Box::pin(async move {
            let open = self
                .inner
                .delayed_open
                .lock()
                .get(&account)
                .copied()
                .unwrap_or(false);
            Ok(OnchainDelayedOrder {
                size_delta_is_zero: !open,
                target_round_id: 0,
                executable_at_time: 0,
                intention_time: 0,
            })
        })
    }

    fn can_liquidate(&self, account: Address) -> BoxFuture<'_, ChainResult<bool>> {
        Box::pin(async move {
            Ok(self
                .inner
                .can_liquidate
                .lock()
                .get(&account)
                .copied()
                .unwrap_or(false))
        })
    }

    fn is_flagged(&self, account: Address) -> BoxFuture<'_, ChainResult<bool>> {
        Box::pin(async move {
            Ok(self
                .inner
                .flagged
                .lock()
                .get(&account)
                .copied()
                .unwrap_or(false))
        })
    }

    fn liquidation_price(&self, account: Address) -> BoxFuture<'_, ChainResult<Decimal>> {
        Box::pin(async move {
            self.inner
                .liq_prices
                .lock()
                .get(&account)
                .copied()
                .ok_or_else(|| ChainError::Decode("no liquidation price scripted".into()))
        })
    }

    fn estimate_gas(&self, _call: &MarketCall) -> BoxFuture<'_, ChainResult<u64>> {
        Box::pin(async { Ok(100_000) })
    }

    fn submit(&self, call: MarketCall, opts: TxOptions) -> BoxFuture<'_, ChainResult<PendingTx>> {
        Box::pin(async move {
            self.inner.submission_attempts.fetch_add(1, Ordering::SeqCst);
            if self.inner.fail_submissions.load(Ordering::SeqCst) {
                return Err(ChainError::Reverted(B256::ZERO));
            }
            let account = call.account();
            if let MarketCall::FlagPosition(_) = call {
                self.inner.flagged.lock().insert(account, true);
            }
            self.inner.submitted.lock().push(Self::call_name(&call).to_owned());
            self.inner.submitted_nonces.lock().push(opts.nonce);
            Ok(ok_pending())
        })
    }

    fn encode_call(&self, call: &MarketCall) -> Bytes {
        let mut raw = Vec::with_capacity(21);
        raw.push(Self::call_discriminant(call));
        raw.extend_from_slice(call.account().as_slice());
        raw.into()
    }
}

// ============================================================================
// MockMulticall
// ============================================================================

struct MockMulticallInner {
    /// Accounts whose flag dry-run should report success.
    accepts: Mutex<HashSet<Address>>,
    dry_runs: AtomicUsize,
    submitted_batches: Mutex<Vec<Vec<Address>>>,
}

#[derive(Clone)]
pub struct MockMulticall {
    inner: Arc<MockMulticallInner>,
}

impl MockMulticall {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MockMulticallInner {
                accepts: Mutex::new(HashSet::new()),
                dry_runs: AtomicUsize::new(0),
                submitted_batches: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn accept(&self, account: Address) {
        self.inner.accepts.lock().insert(account);
    }

    pub fn dry_runs(&self) -> usize {
        self.inner.dry_runs.load(Ordering::SeqCst)
    }

    pub fn submitted_batches(&self) -> Vec<Vec<Address>> {
        self.inner.submitted_batches.lock().clone()
    }
}

impl Multicall for MockMulticall {
    fn dry_run(&self, calls: Vec<Call3>) -> BoxFuture<'_, ChainResult<Vec<Call3Result>>> {
        Box::pin(async move {
            self.inner.dry_runs.fetch_add(1, Ordering::SeqCst);
            let accepts = self.inner.accepts.lock();
            Ok(calls
                .iter()
                .map(|call| Call3Result {
                    success: accepts.contains(&MockMarket::decode_account(&call.calldata)),
                    return_data: Bytes::new(),
                })
                .collect())
        })
    }

    fn estimate_gas(&self, calls: Vec<Call3>) -> BoxFuture<'_, ChainResult<u64>> {
        Box::pin(async move { Ok(50_000 * calls.len() as u64) })
    }

    fn submit(&self, calls: Vec<Call3>, _opts: TxOptions) -> BoxFuture<'_, ChainResult<PendingTx>> {
        Box::pin(async move {
            let accounts: Vec<Address> = calls
                .iter()
                .map(|c| MockMarket::decode_account(&c.calldata))
                .collect();
            self.inner.submitted_batches.lock().push(accounts);
            Ok(ok_pending())
        })
    }
}

// ============================================================================
// Pyth mocks
// ============================================================================

pub struct MockPriceService {
    pub fail: AtomicBool,
    pub fetches: AtomicUsize,
}

impl MockPriceService {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
        }
    }
}

impl PriceService for MockPriceService {
    fn latest_vaas(&self, _feed_id: B256) -> keeper_pyth::client::BoxFuture<'_, PythResult<Vec<Bytes>>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if self.fail.load(Ordering::SeqCst) {
                Err(keeper_pyth::PythError::HttpClient("scripted outage".into()))
            } else {
                Ok(vec![Bytes::from_static(b"vaa-bytes")])
            }
        })
    }
}

pub struct MockPythContract;

impl PythContract for MockPythContract {
    fn update_fee<'a>(&'a self, update_data: &'a [Bytes]) -> BoxFuture<'a, ChainResult<U256>> {
        Box::pin(async move { Ok(U256::from(update_data.len() as u64)) })
    }
}

// ============================================================================
// Wiring
// ============================================================================

/// A fresh `KeeperDeps` over a scriptable chain and a real signer pool of
/// `pool_size` random keys.
pub fn deps_with_pool(pool_size: usize) -> (KeeperDeps, Arc<FakeChain>) {
    let chain = Arc::new(FakeChain::default());
    let signers: Vec<PrivateKeySigner> =
        (0..pool_size).map(|_| PrivateKeySigner::random()).collect();
    let pool = Arc::new(SignerPool::new(
        Arc::clone(&chain) as Arc<dyn ChainClient>,
        &signers,
        SignerPoolConfig::default(),
    ));
    let deps = KeeperDeps {
        chain: Arc::clone(&chain) as Arc<dyn ChainClient>,
        pool,
        notifier: Arc::new(LogNotifier),
    };
    (deps, chain)
}
