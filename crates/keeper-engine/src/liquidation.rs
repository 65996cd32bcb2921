//! Liquidation keeper: flag and liquidate underwater positions.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use keeper_chain::{
    BlockInfo, BoxFuture, Call3, ChainResult, MarketCall, MarketContract, Multicall,
};
use keeper_core::params::{LiquidationParams, MULTICALL_PAGE_SIZE};
use keeper_core::{ChainEvent, EventKind, EventPayload, Market, Position};
use keeper_telemetry::Metrics;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::error::EngineResult;
use crate::keeper::{ChainSnapshot, Keeper, KeeperDeps};

const EVENTS_OF_INTEREST: &[EventKind] = &[
    EventKind::FundingRecomputed,
    EventKind::PositionModified,
    EventKind::PositionLiquidated,
    EventKind::PositionFlagged,
];

/// The three disjoint candidate groups, in processing priority order.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LiquidationGroups {
    /// Known liq price within the proximity threshold of the current price;
    /// closest first, higher leverage breaking ties.
    pub close: Vec<Address>,
    /// Unknown liq price, needs a refresh; higher leverage first.
    pub unknown: Vec<Address>,
    /// Known but far and stale liq price; oldest refresh first, truncated
    /// to the per-tick refresh budget.
    pub outdated: Vec<Address>,
}

impl LiquidationGroups {
    pub fn concat(self) -> Vec<Address> {
        let mut all = self.close;
        all.extend(self.unknown);
        all.extend(self.outdated);
        all
    }
}

/// Compute the candidate groups for one tick.
///
/// Pure over the index so the ordering rules are testable in isolation.
pub fn liquidation_groups(
    positions: &HashMap<Address, Position>,
    asset_price: Decimal,
    block_tip_timestamp: u64,
    params: &LiquidationParams,
) -> LiquidationGroups {
    let mut close: Vec<(&Position, Decimal)> = Vec::new();
    let mut unknown: Vec<&Position> = Vec::new();
    let mut outdated: Vec<&Position> = Vec::new();

    let recency_floor =
        block_tip_timestamp.saturating_sub(params.far_price_recency_cutoff.as_secs());

    for position in positions.values().filter(|p| p.is_open()) {
        match position.liq_distance(asset_price) {
            None => unknown.push(position),
            Some(distance) if distance <= params.proximity_threshold => {
                close.push((position, distance));
            }
            Some(_) => {
                if position.liq_price_updated_timestamp < recency_floor {
                    outdated.push(position);
                }
            }
        }
    }

    close.sort_by(|(a, da), (b, db)| {
        da.cmp(db)
            .then_with(|| b.leverage.cmp(&a.leverage))
            .then_with(|| a.account.cmp(&b.account))
    });
    unknown.sort_by(|a, b| {
        b.leverage
            .cmp(&a.leverage)
            .then_with(|| a.account.cmp(&b.account))
    });
    outdated.sort_by(|a, b| {
        a.liq_price_updated_timestamp
            .cmp(&b.liq_price_updated_timestamp)
            .then_with(|| a.account.cmp(&b.account))
    });
    outdated.truncate(params.max_far_prices_to_update);

    LiquidationGroups {
        close: close.into_iter().map(|(p, _)| p.account).collect(),
        unknown: unknown.into_iter().map(|p| p.account).collect(),
        outdated: outdated.into_iter().map(|p| p.account).collect(),
    }
}

enum CandidateOutcome {
    /// Liquidation price refreshed; nothing actionable yet.
    Refreshed(Decimal),
    Liquidated,
}

/// Per-market keeper for liquidations.
///
/// Maintains `account -> Position` from the modification/liquidation event
/// stream; each tick ranks candidates by liquidation proximity and walks
/// them through the flag-then-liquidate protocol.
pub struct LiquidationKeeper {
    market: Market,
    contract: Arc<dyn MarketContract>,
    deps: KeeperDeps,
    multicall: Option<Arc<dyn Multicall>>,
    params: LiquidationParams,
    positions: HashMap<Address, Position>,
    /// Chain clock advanced by `FundingRecomputed`; ages out stale liq
    /// prices without extra RPC.
    block_tip_timestamp: u64,
    /// Asset price delivered by the distributor for the current tick.
    asset_price: Option<Decimal>,
}

impl LiquidationKeeper {
    pub fn new(
        market: Market,
        contract: Arc<dyn MarketContract>,
        deps: KeeperDeps,
        multicall: Option<Arc<dyn Multicall>>,
        params: LiquidationParams,
    ) -> Self {
        Self {
            market,
            contract,
            deps,
            multicall,
            params,
            positions: HashMap::new(),
            block_tip_timestamp: 0,
            asset_price: None,
        }
    }

    /// Open positions, keyed by account.
    pub fn open_positions(&self) -> &HashMap<Address, Position> {
        &self.positions
    }

    fn apply_events(&mut self, events: &[ChainEvent]) {
        for event in events {
            match &event.payload {
                EventPayload::PositionModified {
                    id,
                    account,
                    size,
                    margin,
                    last_price,
                } => {
                    if margin.is_zero() {
                        self.positions.remove(account);
                    } else {
                        self.positions.insert(
                            *account,
                            Position::from_modification(*id, *account, *size, *margin, *last_price),
                        );
                    }
                }
                EventPayload::PositionLiquidated { account }
                | EventPayload::PositionFlagged { account } => {
                    self.positions.remove(account);
                }
                EventPayload::FundingRecomputed { timestamp } => {
                    self.block_tip_timestamp = *timestamp;
                }
                _ => {}
            }
        }
    }

    async fn run_execute(&mut self) -> EngineResult<()> {
        let Some(asset_price) = self.asset_price else {
            debug!(market = %self.market.key, "No asset price this tick; skipping selection");
            return Ok(());
        };
        if self.positions.is_empty() {
            return Ok(());
        }

        let groups = liquidation_groups(
            &self.positions,
            asset_price,
            self.block_tip_timestamp,
            &self.params,
        );
        debug!(
            market = %self.market.key,
            close = groups.close.len(),
            unknown = groups.unknown.len(),
            outdated = groups.outdated.len(),
            "Liquidation candidates selected"
        );
        let candidates = groups.concat();
        if candidates.is_empty() {
            return Ok(());
        }

        if let Some(multicall) = self.multicall.clone() {
            self.flag_via_multicall(&candidates, multicall.as_ref())
                .await;
        }

        for account in candidates {
            match self.process_candidate(account).await {
                Ok(CandidateOutcome::Refreshed(price)) => {
                    if let Some(position) = self.positions.get_mut(&account) {
                        position.liq_price = Some(price);
                        position.liq_price_updated_timestamp = self.block_tip_timestamp;
                    }
                }
                Ok(CandidateOutcome::Liquidated) => {
                    self.positions.remove(&account);
                    Metrics::position_liquidated(self.market.key.as_str());
                    info!(market = %self.market.key, %account, "Position liquidated");
                }
                Err(e) => {
                    warn!(market = %self.market.key, %account, error = %e, "Liquidation task failed");
                    Metrics::keeper_error(self.name(), self.market.key.as_str());
                }
            }
        }
        Ok(())
    }

    /// Cheaply discover which flags the contract will accept, then submit
    /// one batched transaction with only those.
    async fn flag_via_multicall(&self, candidates: &[Address], multicall: &dyn Multicall) {
        for page in candidates.chunks(MULTICALL_PAGE_SIZE) {
            let calls: Vec<Call3> = page
                .iter()
                .map(|account| Call3 {
                    target: self.contract.address(),
                    allow_failure: true,
                    calldata: self
                        .contract
                        .encode_call(&MarketCall::FlagPosition(*account)),
                })
                .collect();

            let results = match multicall.dry_run(calls.clone()).await {
                Ok(results) => results,
                Err(e) => {
                    warn!(market = %self.market.key, error = %e, "Multicall dry-run failed");
                    return;
                }
            };

            let accepted: Vec<Call3> = calls
                .into_iter()
                .zip(&results)
                .filter(|(_, r)| r.success)
                .map(|(c, _)| c)
                .collect();
            if accepted.is_empty() {
                continue;
            }

            debug!(
                market = %self.market.key,
                accepted = accepted.len(),
                page = page.len(),
                "Submitting batched flags via multicall"
            );

            let submitted: EngineResult<()> = self
                .deps
                .pool
                .with_signer(Some(self.market.asset.as_str()), |lease| {
                    let accepted = accepted.clone();
                    async move {
                        let estimate = multicall.estimate_gas(accepted.clone()).await?;
                        let gas_price = self.deps.chain.gas_price().await?;
                        let opts = keeper_chain::TxOptions::new(lease.address(), lease.nonce())
                            .gas_limit(keeper_core::params::with_gas_headroom(estimate))
                            .gas_price(
                                gas_price
                                    .saturating_mul(keeper_core::params::GAS_PRICE_HEADROOM),
                            );
                        let pending = multicall.submit(accepted, opts).await?;
                        crate::keeper::wait_tx(pending).await?;
                        lease.advance();
                        Ok(())
                    }
                })
                .await;
            if let Err(e) = submitted {
                warn!(market = %self.market.key, error = %e, "Multicall flag batch failed");
                Metrics::keeper_error(self.name(), self.market.key.as_str());
            }
        }
    }

    /// The per-candidate protocol: refresh when not yet liquidatable,
    /// otherwise flag (if needed) and liquidate under one signer lease.
    async fn process_candidate(&self, account: Address) -> EngineResult<CandidateOutcome> {
        let can_liquidate = self.contract.can_liquidate(account).await?;
        let flagged = self.contract.is_flagged(account).await?;

        if !can_liquidate && !flagged {
            let price = self.contract.liquidation_price(account).await?;
            return Ok(CandidateOutcome::Refreshed(price));
        }

        let contract = self.contract.as_ref();
        self.deps
            .pool
            .with_signer(Some(self.market.asset.as_str()), |lease| async move {
                if !flagged {
                    self.deps
                        .submit_with_lease(
                            contract,
                            &lease,
                            MarketCall::FlagPosition(account),
                            U256::ZERO,
                        )
                        .await?;
                }
                self.deps
                    .submit_with_lease(
                        contract,
                        &lease,
                        MarketCall::LiquidatePosition(account),
                        U256::ZERO,
                    )
                    .await?;
                Ok(CandidateOutcome::Liquidated)
            })
            .await
    }
}

impl Keeper for LiquidationKeeper {
    fn name(&self) -> &'static str {
        "liquidations"
    }

    fn market(&self) -> &Market {
        &self.market
    }

    fn events_of_interest(&self) -> &'static [EventKind] {
        EVENTS_OF_INTEREST
    }

    fn needs_asset_price(&self) -> bool {
        true
    }

    fn fetch_asset_price(&self) -> BoxFuture<'_, ChainResult<Decimal>> {
        self.contract.asset_price()
    }

    fn update_index(&mut self, events: &[ChainEvent], _block: BlockInfo, price: Option<Decimal>) {
        if price.is_some() {
            self.asset_price = price;
        }
        self.apply_events(events);
    }

    fn hydrate(&mut self, snapshot: &ChainSnapshot) {
        for position in &snapshot.positions {
            self.positions
                .entry(position.account)
                .or_insert_with(|| position.clone());
        }
    }

    fn execute(&mut self) -> BoxFuture<'_, EngineResult<()>> {
        Box::pin(self.run_execute())
    }
}
