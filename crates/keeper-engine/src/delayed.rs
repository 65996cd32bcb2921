//! Delayed-order keepers (on-chain and off-chain execution flavors).

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use keeper_chain::{BlockInfo, BoxFuture, ChainResult, MarketCall, MarketContract};
use keeper_core::{params, ChainEvent, DelayedOrder, EventKind, EventPayload, Market};
use keeper_pyth::PriceService;
use keeper_telemetry::Metrics;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::keeper::{ChainSnapshot, Keeper, KeeperDeps};

/// Which execution path a keeper instance drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderFlavor {
    /// `executeDelayedOrder`, triggered by round or time.
    Onchain,
    /// `executeOffchainDelayedOrder` with a signed Pyth payload.
    Offchain,
}

/// Collaborators for the off-chain flavor: the price service that signs
/// updates and the on-chain Pyth endpoint that prices them.
pub struct OffchainPricing {
    pub price_service: Arc<dyn PriceService>,
    pub pyth_contract: Arc<dyn keeper_chain::PythContract>,
    pub feed_id: B256,
}

#[derive(Debug, Clone)]
pub struct DelayedKeeperConfig {
    /// Per-order failure budget; the entry is evicted once exceeded.
    pub max_exec_attempts: u32,
}

impl Default for DelayedKeeperConfig {
    fn default() -> Self {
        Self {
            max_exec_attempts: 10,
        }
    }
}

const EVENTS_OF_INTEREST: &[EventKind] = &[
    EventKind::DelayedOrderSubmitted,
    EventKind::DelayedOrderRemoved,
];

enum OrderOutcome {
    Executed,
    /// The order vanished on-chain before we could submit; success-ish.
    AlreadyExecuted,
    /// Counts against the order's failure budget.
    Failed(EngineError),
    /// Soft error (pool exhaustion); retried next tick without a charge.
    SoftRetry(EngineError),
}

/// Per-market keeper for delayed orders.
///
/// Maintains `account -> DelayedOrder` from the submitted/removed event
/// stream and executes orders whose target round or executable time has
/// been reached.
pub struct DelayedOrdersKeeper {
    market: Market,
    contract: Arc<dyn MarketContract>,
    deps: KeeperDeps,
    flavor: OrderFlavor,
    pricing: Option<OffchainPricing>,
    config: DelayedKeeperConfig,
    orders: HashMap<Address, DelayedOrder>,
}

impl DelayedOrdersKeeper {
    pub fn onchain(
        market: Market,
        contract: Arc<dyn MarketContract>,
        deps: KeeperDeps,
        config: DelayedKeeperConfig,
    ) -> Self {
        Self {
            market,
            contract,
            deps,
            flavor: OrderFlavor::Onchain,
            pricing: None,
            config,
            orders: HashMap::new(),
        }
    }

    pub fn offchain(
        market: Market,
        contract: Arc<dyn MarketContract>,
        deps: KeeperDeps,
        config: DelayedKeeperConfig,
        pricing: OffchainPricing,
    ) -> Self {
        Self {
            market,
            contract,
            deps,
            flavor: OrderFlavor::Offchain,
            pricing: Some(pricing),
            config,
            orders: HashMap::new(),
        }
    }

    fn is_offchain(&self) -> bool {
        self.flavor == OrderFlavor::Offchain
    }

    /// Open orders, keyed by account.
    pub fn open_orders(&self) -> &HashMap<Address, DelayedOrder> {
        &self.orders
    }

    fn apply_events(&mut self, events: &[ChainEvent], block: BlockInfo) {
        for event in events {
            match &event.payload {
                EventPayload::DelayedOrderSubmitted {
                    account,
                    is_offchain,
                    target_round_id,
                    intention_time,
                    executable_at_time,
                    ..
                } if *is_offchain == self.is_offchain() => {
                    // Older deployments omit intentionTime; fall back to the
                    // event's block timestamp, then the tick block.
                    let intention = intention_time
                        .or(event.block_timestamp)
                        .unwrap_or(block.timestamp);
                    self.orders.insert(
                        *account,
                        DelayedOrder::new(
                            *account,
                            *target_round_id,
                            *executable_at_time,
                            intention,
                        ),
                    );
                }
                EventPayload::DelayedOrderRemoved {
                    account,
                    is_offchain,
                } if *is_offchain == self.is_offchain() => {
                    self.orders.remove(account);
                }
                _ => {}
            }
        }
    }

    async fn run_execute(&mut self) -> EngineResult<()> {
        if self.orders.is_empty() {
            return Ok(());
        }

        let current_round_id = self.contract.current_round_id().await?;
        let now = self.deps.chain.latest_block().await?.timestamp;

        let mut ready: Vec<Address> = self
            .orders
            .values()
            .filter(|o| o.is_ready(current_round_id, now))
            .map(|o| o.account)
            .collect();
        if ready.is_empty() {
            return Ok(());
        }
        // Stable selection order within the tick.
        ready.sort();

        debug!(
            keeper = self.name(),
            market = %self.market.key,
            ready = ready.len(),
            current_round_id,
            now,
            "Executing ready delayed orders"
        );

        let batches = ready.chunks(params::MAX_BATCH_SIZE).count();
        for (batch, chunk) in ready.chunks(params::MAX_BATCH_SIZE).enumerate() {
            let outcomes = {
                let this: &Self = self;
                futures::future::join_all(chunk.iter().copied().map(|account| async move {
                    (account, this.execute_order(account).await)
                }))
                .await
            };
            for (account, outcome) in outcomes {
                self.apply_outcome(account, outcome);
            }
            if batch + 1 < batches {
                tokio::time::sleep(params::BATCH_WAIT_TIME).await;
            }
        }
        Ok(())
    }

    async fn execute_order(&self, account: Address) -> OrderOutcome {
        // Re-read before submitting; the order may have been executed or
        // cancelled since indexing.
        let onchain = match self.contract.delayed_order(account).await {
            Ok(order) => order,
            Err(e) => return OrderOutcome::Failed(e.into()),
        };
        if onchain.size_delta_is_zero {
            return OrderOutcome::AlreadyExecuted;
        }

        let (call, value) = match self.build_call(account).await {
            Ok(pair) => pair,
            Err(e) => return OrderOutcome::Failed(e),
        };

        match self
            .deps
            .submit_tracked(self.contract.as_ref(), &self.market.asset, call, value)
            .await
        {
            Ok(outcome) => {
                info!(
                    keeper = self.name(),
                    market = %self.market.key,
                    %account,
                    tx = %outcome.hash,
                    "Delayed order executed"
                );
                OrderOutcome::Executed
            }
            Err(e) if e.is_soft() => OrderOutcome::SoftRetry(e),
            Err(e) => {
                // The revert may mean someone else executed it first.
                if let Ok(order) = self.contract.delayed_order(account).await {
                    if order.size_delta_is_zero {
                        return OrderOutcome::AlreadyExecuted;
                    }
                }
                OrderOutcome::Failed(e)
            }
        }
    }

    /// Assemble the execution call; the off-chain flavor fetches and prices
    /// a signed Pyth update first, before any signer is leased.
    async fn build_call(&self, account: Address) -> EngineResult<(MarketCall, U256)> {
        match self.flavor {
            OrderFlavor::Onchain => Ok((MarketCall::ExecuteDelayedOrder(account), U256::ZERO)),
            OrderFlavor::Offchain => {
                let pricing = self
                    .pricing
                    .as_ref()
                    .ok_or_else(|| EngineError::MissingPriceFeed(self.market.key.to_string()))?;
                let update_data = pricing.price_service.latest_vaas(pricing.feed_id).await?;
                let fee = pricing.pyth_contract.update_fee(&update_data).await?;
                Ok((
                    MarketCall::ExecuteOffchainDelayedOrder(account, update_data),
                    fee,
                ))
            }
        }
    }

    fn apply_outcome(&mut self, account: Address, outcome: OrderOutcome) {
        let market = self.market.key.as_str();
        match outcome {
            OrderOutcome::Executed => {
                self.orders.remove(&account);
                match self.flavor {
                    OrderFlavor::Onchain => Metrics::delayed_order_executed(market),
                    OrderFlavor::Offchain => Metrics::offchain_order_executed(market),
                }
            }
            OrderOutcome::AlreadyExecuted => {
                debug!(market, %account, "Order already executed; dropping from index");
                self.orders.remove(&account);
                Metrics::delayed_order_already_executed(market);
            }
            OrderOutcome::SoftRetry(e) => {
                debug!(market, %account, error = %e, "Signer pool busy; order retried next tick");
            }
            OrderOutcome::Failed(e) => {
                warn!(market, %account, error = %e, "Delayed order execution failed");
                Metrics::keeper_error(self.name(), market);
                if let Some(order) = self.orders.get_mut(&account) {
                    order.execution_failures += 1;
                    if order.execution_failures > self.config.max_exec_attempts {
                        self.orders.remove(&account);
                        self.deps.notifier.notify(&format!(
                            "dropping delayed order for {account} on {market}: \
                             exceeded {} execution attempts",
                            self.config.max_exec_attempts
                        ));
                    }
                }
            }
        }
    }
}

impl Keeper for DelayedOrdersKeeper {
    fn name(&self) -> &'static str {
        match self.flavor {
            OrderFlavor::Onchain => "delayed-orders",
            OrderFlavor::Offchain => "offchain-delayed-orders",
        }
    }

    fn market(&self) -> &Market {
        &self.market
    }

    fn events_of_interest(&self) -> &'static [EventKind] {
        EVENTS_OF_INTEREST
    }

    fn fetch_asset_price(&self) -> BoxFuture<'_, ChainResult<Decimal>> {
        self.contract.asset_price()
    }

    fn update_index(&mut self, events: &[ChainEvent], block: BlockInfo, _price: Option<Decimal>) {
        self.apply_events(events, block);
    }

    fn hydrate(&mut self, snapshot: &ChainSnapshot) {
        for order in &snapshot.orders {
            self.orders
                .entry(order.account)
                .or_insert_with(|| order.clone());
        }
    }

    fn execute(&mut self) -> BoxFuture<'_, EngineResult<()>> {
        Box::pin(self.run_execute())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        block_at, deps_with_pool, order_submitted, removed, MockMarket, MockPriceService,
        MockPythContract,
    };
    use std::sync::atomic::Ordering;

    fn keeper_with(market: MockMarket) -> DelayedOrdersKeeper {
        let contract = Arc::new(market);
        let (deps, _chain) = deps_with_pool(1);
        DelayedOrdersKeeper::onchain(
            Market::new(
                keeper_core::MarketKey::new("sETHPERP"),
                "sETH",
                Address::repeat_byte(0xEE),
            ),
            contract,
            deps,
            DelayedKeeperConfig {
                max_exec_attempts: 10,
            },
        )
    }

    fn account(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[tokio::test]
    async fn submit_then_execute_removes_entry() {
        // Ready by round: exactly one executeDelayedOrder, then the entry goes.
        let market = MockMarket::new("sETHPERP");
        market.set_current_round(101);
        market.set_delayed_order_open(account(0xA), true);
        let mut keeper = keeper_with(market.clone());

        keeper.update_index(
            &[order_submitted(account(0xA), false, 100, Some(950), 1000)],
            block_at(1, 900),
            None,
        );
        assert_eq!(keeper.open_orders().len(), 1);

        keeper.execute().await.unwrap();

        assert_eq!(market.submitted_calls(), vec!["executeDelayedOrder"]);
        assert!(keeper.open_orders().is_empty());
    }

    #[tokio::test]
    async fn submit_then_remove_yields_empty_index() {
        let market = MockMarket::new("sETHPERP");
        market.set_current_round(u64::MAX);
        let mut keeper = keeper_with(market.clone());

        keeper.update_index(
            &[
                order_submitted(account(0xA), false, 100, Some(950), 1000),
                removed(account(0xA), false),
            ],
            block_at(1, 900),
            None,
        );
        assert!(keeper.open_orders().is_empty());

        keeper.execute().await.unwrap();
        assert!(market.submitted_calls().is_empty());
    }

    #[tokio::test]
    async fn not_ready_orders_are_left_alone() {
        let market = MockMarket::new("sETHPERP");
        market.set_current_round(99);
        // FakeChain's latest block timestamp (900) is before executableAtTime.
        let mut keeper = keeper_with(market.clone());

        keeper.update_index(
            &[order_submitted(account(0xA), false, 100, Some(950), 1000)],
            block_at(1, 900),
            None,
        );
        keeper.execute().await.unwrap();

        assert!(market.submitted_calls().is_empty());
        assert_eq!(keeper.open_orders().len(), 1);
    }

    #[tokio::test]
    async fn offchain_events_are_ignored_by_onchain_keeper() {
        let market = MockMarket::new("sETHPERP");
        let mut keeper = keeper_with(market);

        keeper.update_index(
            &[order_submitted(account(0xA), true, 100, Some(950), 1000)],
            block_at(1, 900),
            None,
        );
        assert!(keeper.open_orders().is_empty());
    }

    #[tokio::test]
    async fn vanished_order_counts_already_executed_without_tx() {
        let market = MockMarket::new("sETHPERP");
        market.set_current_round(101);
        // On-chain re-read reports sizeDelta == 0.
        market.set_delayed_order_open(account(0xA), false);
        let mut keeper = keeper_with(market.clone());

        keeper.update_index(
            &[order_submitted(account(0xA), false, 100, Some(950), 1000)],
            block_at(1, 900),
            None,
        );
        keeper.execute().await.unwrap();

        assert!(market.submitted_calls().is_empty());
        assert!(keeper.open_orders().is_empty());
    }

    #[tokio::test]
    async fn failures_exceeding_budget_evict_the_order() {
        // Reverts 11 times against a budget of 10; the 11th tick
        // removes the entry and no further tx is attempted.
        let market = MockMarket::new("sETHPERP");
        market.set_current_round(101);
        market.set_delayed_order_open(account(0xA), true);
        market.fail_submissions(true);
        let mut keeper = keeper_with(market.clone());

        keeper.update_index(
            &[order_submitted(account(0xA), false, 100, Some(950), 1000)],
            block_at(1, 900),
            None,
        );

        for tick in 1..=11u32 {
            keeper.execute().await.unwrap();
            if tick <= 10 {
                assert_eq!(
                    keeper.open_orders().get(&account(0xA)).unwrap().execution_failures,
                    tick
                );
            }
        }
        assert!(keeper.open_orders().is_empty());

        let attempts_so_far = market.submission_attempts();
        keeper.execute().await.unwrap();
        assert_eq!(market.submission_attempts(), attempts_so_far);
    }

    #[tokio::test]
    async fn replaying_the_same_events_is_idempotent() {
        let market = MockMarket::new("sETHPERP");
        let mut keeper = keeper_with(market);

        let events = vec![
            order_submitted(account(0xA), false, 100, Some(950), 1000),
            order_submitted(account(0xB), false, 200, Some(960), 2000),
            removed(account(0xB), false),
        ];
        keeper.update_index(&events, block_at(1, 900), None);
        let first = keeper.open_orders().clone();
        keeper.update_index(&events, block_at(1, 900), None);
        assert_eq!(*keeper.open_orders(), first);
    }

    #[tokio::test]
    async fn hydrate_keeps_in_memory_entries() {
        let market = MockMarket::new("sETHPERP");
        let mut keeper = keeper_with(market);

        keeper.update_index(
            &[order_submitted(account(0xA), false, 100, Some(950), 1000)],
            block_at(5, 900),
            None,
        );
        // Drift the in-memory entry.
        keeper
            .orders
            .get_mut(&account(0xA))
            .unwrap()
            .execution_failures = 3;

        let snapshot = ChainSnapshot {
            block: 5,
            positions: Vec::new(),
            orders: vec![
                DelayedOrder::new(account(0xA), 100, 1000, 950),
                DelayedOrder::new(account(0xC), 7, 70, 60),
            ],
        };
        keeper.hydrate(&snapshot);

        // In-memory wins for the drifted failure counter; new keys merge in.
        assert_eq!(
            keeper.open_orders().get(&account(0xA)).unwrap().execution_failures,
            3
        );
        assert!(keeper.open_orders().contains_key(&account(0xC)));
    }

    #[tokio::test]
    async fn hydrate_then_tail_replay_matches_full_replay() {
        let full_history = vec![
            {
                let mut e = order_submitted(account(0xA), false, 100, Some(10), 1000);
                e.block_number = 1;
                e
            },
            {
                let mut e = order_submitted(account(0xB), false, 200, Some(20), 2000);
                e.block_number = 2;
                e
            },
            {
                let mut e = removed(account(0xA), false);
                e.block_number = 3;
                e
            },
        ];

        let mut replayed = keeper_with(MockMarket::new("sETHPERP"));
        replayed.update_index(&full_history, block_at(3, 900), None);

        // Snapshot at block 2 carries both open orders; only block 3 events
        // replay on top.
        let mut hydrated = keeper_with(MockMarket::new("sETHPERP"));
        hydrated.hydrate(&ChainSnapshot {
            block: 2,
            positions: Vec::new(),
            orders: vec![
                DelayedOrder::new(account(0xA), 100, 1000, 10),
                DelayedOrder::new(account(0xB), 200, 2000, 20),
            ],
        });
        let tail: Vec<_> = full_history
            .iter()
            .filter(|e| e.block_number > 2)
            .cloned()
            .collect();
        hydrated.update_index(&tail, block_at(3, 900), None);

        assert_eq!(*replayed.open_orders(), *hydrated.open_orders());
    }

    fn offchain_keeper_with(
        market: MockMarket,
        price_service: Arc<MockPriceService>,
    ) -> DelayedOrdersKeeper {
        let contract = Arc::new(market);
        let (deps, _chain) = deps_with_pool(1);
        DelayedOrdersKeeper::offchain(
            Market::new(
                keeper_core::MarketKey::new("sETHPERP"),
                "sETH",
                Address::repeat_byte(0xEE),
            ),
            contract,
            deps,
            DelayedKeeperConfig {
                max_exec_attempts: 10,
            },
            OffchainPricing {
                price_service,
                pyth_contract: Arc::new(MockPythContract),
                feed_id: B256::repeat_byte(0x42),
            },
        )
    }

    #[tokio::test]
    async fn offchain_keeper_submits_with_pyth_payload() {
        let market = MockMarket::new("sETHPERP");
        market.set_current_round(101);
        market.set_delayed_order_open(account(0xA), true);
        let price_service = Arc::new(MockPriceService::new());
        let mut keeper = offchain_keeper_with(market.clone(), Arc::clone(&price_service));

        keeper.update_index(
            &[order_submitted(account(0xA), true, 100, Some(950), 1000)],
            block_at(1, 900),
            None,
        );
        keeper.execute().await.unwrap();

        assert_eq!(price_service.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(
            market.submitted_calls(),
            vec!["executeOffchainDelayedOrder"]
        );
        assert!(keeper.open_orders().is_empty());
    }

    #[tokio::test]
    async fn pyth_outage_requeues_with_one_failure_charged() {
        let market = MockMarket::new("sETHPERP");
        market.set_current_round(101);
        market.set_delayed_order_open(account(0xA), true);
        let price_service = Arc::new(MockPriceService::new());
        price_service.fail.store(true, Ordering::SeqCst);
        let mut keeper = offchain_keeper_with(market.clone(), Arc::clone(&price_service));

        keeper.update_index(
            &[order_submitted(account(0xA), true, 100, Some(950), 1000)],
            block_at(1, 900),
            None,
        );
        keeper.execute().await.unwrap();

        // No transaction went out; the order stays queued with one failure.
        assert!(market.submitted_calls().is_empty());
        let order = keeper.open_orders().get(&account(0xA)).unwrap();
        assert_eq!(order.execution_failures, 1);
    }

    #[tokio::test]
    async fn missing_intention_time_falls_back_to_block_timestamp() {
        let market = MockMarket::new("sETHPERP");
        let mut keeper = keeper_with(market);

        let mut event = order_submitted(account(0xA), false, 100, None, 1000);
        event.block_timestamp = Some(1234);
        keeper.update_index(&[event], block_at(1, 900), None);

        assert_eq!(
            keeper.open_orders().get(&account(0xA)).unwrap().intention_time,
            1234
        );
    }
}
