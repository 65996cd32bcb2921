//! The outer loop: range selection, event fan-out, keeper scheduling.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use keeper_chain::{ChainClient, EventSource};
use keeper_core::params;
use keeper_telemetry::Metrics;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::EngineResult;
use crate::keeper::{run_keeper_task, Keeper, SnapshotProvider};

#[derive(Debug, Clone)]
pub struct DistributorConfig {
    /// Tick cadence.
    pub process_interval: Duration,
    /// Cap on blocks processed by one tick after downtime.
    pub max_backlog: u64,
    /// Hard deadline for draining the current tick on shutdown.
    pub shutdown_grace: Duration,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            process_interval: Duration::from_secs(5),
            max_backlog: params::MAX_BACKLOG,
            shutdown_grace: params::SHUTDOWN_GRACE,
        }
    }
}

/// Drives every keeper through `update_index` then `execute` once per tick.
///
/// `last_processed_block` only advances when *all* keepers succeeded for the
/// range, so a failed scan is retried next tick and no keeper ever misses
/// events.
pub struct Distributor {
    chain: Arc<dyn ChainClient>,
    source: EventSource,
    keepers: Vec<Box<dyn Keeper>>,
    snapshots: Option<Arc<dyn SnapshotProvider>>,
    config: DistributorConfig,
    last_processed_block: u64,
    started: Instant,
}

impl Distributor {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        source: EventSource,
        keepers: Vec<Box<dyn Keeper>>,
        snapshots: Option<Arc<dyn SnapshotProvider>>,
        config: DistributorConfig,
        from_block: u64,
    ) -> Self {
        Self {
            chain,
            source,
            keepers,
            snapshots,
            config,
            last_processed_block: from_block.saturating_sub(1),
            started: Instant::now(),
        }
    }

    /// The highest block every keeper has fully observed.
    pub fn last_processed_block(&self) -> u64 {
        self.last_processed_block
    }

    /// Preload keeper indices from a snapshot provider so keepers become
    /// active without replaying deep history. Failures are logged and the
    /// keeper starts from its event replay alone.
    pub async fn hydrate(&mut self) {
        let Some(provider) = self.snapshots.clone() else {
            debug!("No snapshot provider configured; skipping hydration");
            return;
        };
        for keeper in &mut self.keepers {
            let market = keeper.market().key.clone();
            match provider.snapshot(&market).await {
                Ok(snapshot) => {
                    if snapshot.block > self.last_processed_block {
                        self.last_processed_block = snapshot.block;
                    }
                    info!(
                        keeper = keeper.name(),
                        %market,
                        block = snapshot.block,
                        positions = snapshot.positions.len(),
                        orders = snapshot.orders.len(),
                        "Hydrated keeper index"
                    );
                    keeper.hydrate(&snapshot);
                }
                Err(e) => {
                    warn!(keeper = keeper.name(), %market, error = %e, "Hydration failed");
                }
            }
        }
    }

    /// Run until `shutdown` flips true; the in-flight tick drains under the
    /// grace deadline.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> EngineResult<()> {
        self.hydrate().await;

        let mut interval = tokio::time::interval(self.config.process_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    let grace = self.config.shutdown_grace;
                    let tick = self.tick();
                    tokio::pin!(tick);
                    tokio::select! {
                        _ = &mut tick => {}
                        _ = shutdown.changed() => {
                            if tokio::time::timeout(grace, &mut tick).await.is_err() {
                                warn!("Tick aborted at the shutdown grace deadline");
                            }
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(
            last_processed_block = self.last_processed_block,
            "Distributor stopped"
        );
        Ok(())
    }

    /// One tick: pick the range, then scan → index → execute per keeper.
    pub async fn tick(&mut self) {
        let started = Instant::now();
        Metrics::up_time(self.started.elapsed().as_secs_f64());

        let tip = match self.chain.block_number().await {
            Ok(tip) => tip,
            Err(e) => {
                warn!(error = %e, "Failed to read chain tip; skipping tick");
                return;
            }
        };
        if tip <= self.last_processed_block {
            return;
        }

        let delta = tip - self.last_processed_block;
        Metrics::block_delta(delta as f64);
        let to_block = if delta > self.config.max_backlog {
            warn!(
                delta,
                max_backlog = self.config.max_backlog,
                "Backlog exceeds cap; clamping scan range"
            );
            self.last_processed_block + self.config.max_backlog
        } else {
            tip
        };
        let from_block = self.last_processed_block + 1;

        let block = match self.chain.block(to_block).await {
            Ok(block) => block,
            Err(e) => {
                warn!(to_block, error = %e, "Failed to read tick block; range retried next tick");
                return;
            }
        };

        let chain = Arc::clone(&self.chain);
        let source = &self.source;
        let mut timestamps: HashMap<u64, u64> = HashMap::new();
        let mut all_ok = true;

        for keeper in &mut self.keepers {
            let market = keeper.market().key.clone();
            let contract = keeper.market().address;

            let mut events = match source
                .get_events(contract, keeper.events_of_interest(), from_block, to_block)
                .await
            {
                Ok(events) => events,
                Err(e) => {
                    warn!(
                        keeper = keeper.name(),
                        %market,
                        error = %e,
                        "Event scan failed; keeper skipped this tick"
                    );
                    Metrics::keeper_error(keeper.name(), market.as_str());
                    all_ok = false;
                    continue;
                }
            };

            // Backfill timestamps the provider didn't attach, one block
            // lookup per distinct height per tick.
            for event in events.iter_mut().filter(|e| e.block_timestamp.is_none()) {
                if let Some(ts) = timestamps.get(&event.block_number) {
                    event.block_timestamp = Some(*ts);
                    continue;
                }
                if let Ok(info) = chain.block(event.block_number).await {
                    timestamps.insert(event.block_number, info.timestamp);
                    event.block_timestamp = Some(info.timestamp);
                }
            }

            let price = if keeper.needs_asset_price() {
                match keeper.fetch_asset_price().await {
                    Ok(price) => Some(price),
                    Err(e) => {
                        warn!(keeper = keeper.name(), %market, error = %e, "Asset price fetch failed");
                        None
                    }
                }
            } else {
                None
            };

            keeper.update_index(&events, block, price);

            let name = keeper.name();
            run_keeper_task(name, market.as_str(), "execute", keeper.execute()).await;
        }

        if all_ok {
            self.last_processed_block = to_block;
        }
        Metrics::block_process_time(started.elapsed().as_millis() as f64);
        debug!(
            from_block,
            to_block,
            advanced = all_ok,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Tick complete"
        );
    }
}
