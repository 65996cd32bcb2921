//! The keeper capability interface and shared task helpers.

use std::sync::Arc;
use std::time::Instant;

use alloy::primitives::U256;
use keeper_chain::{
    BlockInfo, BoxFuture, ChainClient, ChainError, ChainResult, MarketCall, MarketContract,
    PendingTx, TxOptions, TxOutcome,
};
use keeper_core::{params, ChainEvent, DelayedOrder, EventKind, Market, MarketKey, Position};
use keeper_signer::{SignerHandle, SignerPool};
use keeper_telemetry::Metrics;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::notifier::Notifier;

/// On-chain state preloaded at startup so a keeper becomes active before
/// replaying event history.
#[derive(Debug, Clone, Default)]
pub struct ChainSnapshot {
    /// Block the snapshot was taken at.
    pub block: u64,
    pub positions: Vec<Position>,
    pub orders: Vec<DelayedOrder>,
}

/// External source of startup snapshots (indexer, subgraph, ...).
pub trait SnapshotProvider: Send + Sync {
    fn snapshot<'a>(&'a self, market: &'a MarketKey) -> BoxFuture<'a, EngineResult<ChainSnapshot>>;
}

/// The per-market actor contract the [`crate::Distributor`] drives.
///
/// Ticks are serial per keeper: `update_index` for tick N happens before
/// `execute` for tick N, which happens before `update_index` for tick N+1.
/// The index is private to the keeper, so no locking is involved.
pub trait Keeper: Send {
    /// Stable name for logs and metrics.
    fn name(&self) -> &'static str;

    fn market(&self) -> &Market;

    /// Event-kind filter for the scan.
    fn events_of_interest(&self) -> &'static [EventKind];

    /// Whether the distributor should fetch the asset price for this tick.
    fn needs_asset_price(&self) -> bool {
        false
    }

    /// Current asset price read, for keepers that asked for one.
    fn fetch_asset_price(&self) -> BoxFuture<'_, ChainResult<Decimal>>;

    /// Apply one tick's events to the in-memory index. Pure and idempotent
    /// over already-seen events.
    fn update_index(&mut self, events: &[ChainEvent], block: BlockInfo, price: Option<Decimal>);

    /// Merge a startup snapshot; where both sides carry a key, in-memory
    /// values win for fields that can drift.
    fn hydrate(&mut self, snapshot: &ChainSnapshot);

    /// Select and submit actions. Per-item errors are swallowed and
    /// metric-counted inside; only tick-level failures surface.
    fn execute(&mut self) -> BoxFuture<'_, EngineResult<()>>;
}

/// Await one confirmation with the configured timeout.
pub async fn wait_tx(pending: PendingTx) -> EngineResult<TxOutcome> {
    let hash = pending.hash();
    match tokio::time::timeout(params::TX_CONFIRM_TIMEOUT, pending.confirmed()).await {
        Ok(outcome) => Ok(outcome?),
        Err(_) => Err(ChainError::ConfirmationTimeout(hash).into()),
    }
}

/// Run a per-item keeper task: time it, swallow and count its failure.
pub async fn run_keeper_task<F>(keeper: &str, market: &str, id: &str, task: F)
where
    F: std::future::Future<Output = EngineResult<()>>,
{
    let started = Instant::now();
    match task.await {
        Ok(()) => debug!(
            keeper,
            market,
            id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Keeper task done"
        ),
        Err(e) => {
            warn!(keeper, market, id, error = %e, "Keeper task failed");
            Metrics::keeper_error(keeper, market);
        }
    }
}

/// Collaborators shared by every keeper, passed by composition.
#[derive(Clone)]
pub struct KeeperDeps {
    pub chain: Arc<dyn ChainClient>,
    pub pool: Arc<SignerPool>,
    pub notifier: Arc<dyn Notifier>,
}

impl KeeperDeps {
    /// Estimate, submit and confirm one call under an already-held lease.
    ///
    /// Applies the gas headroom knobs (limit ×1.2 of the estimate, price ×2
    /// of `eth_gasPrice`) and advances the lease nonce on confirmation.
    pub async fn submit_with_lease(
        &self,
        contract: &dyn MarketContract,
        lease: &SignerHandle,
        call: MarketCall,
        value: U256,
    ) -> EngineResult<TxOutcome> {
        let estimate = contract.estimate_gas(&call).await?;
        let gas_price = self.chain.gas_price().await?;
        let opts = TxOptions::new(lease.address(), lease.nonce())
            .gas_limit(params::with_gas_headroom(estimate))
            .gas_price(gas_price.saturating_mul(params::GAS_PRICE_HEADROOM))
            .value(value);

        let pending = contract.submit(call, opts).await?;
        let outcome = wait_tx(pending).await?;
        lease.advance();
        Ok(outcome)
    }

    /// Lease a signer and run [`Self::submit_with_lease`] for one call.
    pub async fn submit_tracked(
        &self,
        contract: &dyn MarketContract,
        asset: &str,
        call: MarketCall,
        value: U256,
    ) -> EngineResult<TxOutcome> {
        self.pool
            .with_signer(Some(asset), |lease| async move {
                self.submit_with_lease(contract, &lease, call, value).await
            })
            .await
    }
}
