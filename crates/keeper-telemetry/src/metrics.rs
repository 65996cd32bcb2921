//! Prometheus metrics for the perps keeper.
//!
//! The metric namespace is dimensioned once at startup with the network name
//! (`Metrics::init`); individual recordings never attach ad-hoc dimensions.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means duplicate metric names, which should crash at startup rather than
//! fail silently. These panics only occur during static initialization.

use once_cell::sync::{Lazy, OnceCell};
use prometheus::{
    register_counter_vec, register_gauge_vec, CounterVec, GaugeVec,
};

/// Network dimension, set once by [`Metrics::init`].
static NETWORK: OnceCell<String> = OnceCell::new();

fn network() -> &'static str {
    NETWORK.get().map(String::as_str).unwrap_or("unknown")
}

/// Keeper process up-time in seconds.
pub static KEEPER_UP_TIME: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "perps_keeper_up_time_seconds",
        "Keeper process up-time in seconds",
        &["network"]
    )
    .unwrap()
});

/// Per-signer ETH balance.
pub static KEEPER_SIGNER_ETH_BALANCE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "perps_keeper_signer_eth_balance",
        "ETH balance per signing key",
        &["network", "signer"]
    )
    .unwrap()
});

/// Keeper startups.
pub static KEEPER_START_UP: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perps_keeper_start_up_total",
        "Keeper process startups",
        &["network"]
    )
    .unwrap()
});

/// Swallowed per-keeper errors.
pub static KEEPER_ERROR: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perps_keeper_error_total",
        "Errors caught per keeper without aborting the tick",
        &["network", "keeper", "market"]
    )
    .unwrap()
});

/// Blocks between chain tip and last processed block at tick start.
pub static DISTRIBUTOR_BLOCK_DELTA: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "perps_keeper_distributor_block_delta",
        "Backlog between chain tip and last processed block",
        &["network"]
    )
    .unwrap()
});

/// Wall-clock duration of one distributor tick, milliseconds.
pub static DISTRIBUTOR_BLOCK_PROCESS_TIME: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "perps_keeper_distributor_block_process_time_ms",
        "Duration of one distributor tick in milliseconds",
        &["network"]
    )
    .unwrap()
});

/// Delayed orders executed on-chain by this keeper.
pub static DELAYED_ORDER_EXECUTED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perps_keeper_delayed_order_executed_total",
        "Delayed orders executed",
        &["network", "market"]
    )
    .unwrap()
});

/// Delayed orders found already executed when re-read before submit.
pub static DELAYED_ORDER_ALREADY_EXECUTED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perps_keeper_delayed_order_already_executed_total",
        "Delayed orders that vanished before submission",
        &["network", "market"]
    )
    .unwrap()
});

/// Off-chain delayed orders executed with a Pyth payload.
pub static OFFCHAIN_ORDER_EXECUTED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perps_keeper_offchain_order_executed_total",
        "Off-chain delayed orders executed",
        &["network", "market"]
    )
    .unwrap()
});

/// Positions liquidated by this keeper.
pub static POSITION_LIQUIDATED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "perps_keeper_position_liquidated_total",
        "Positions liquidated",
        &["network", "market"]
    )
    .unwrap()
});

/// Configured signer pool size.
pub static SIGNER_POOL_SIZE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "perps_keeper_signer_pool_size",
        "Number of configured signing keys",
        &["network"]
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Attach the network dimension. Call once at startup, before any
    /// recording. Subsequent calls are ignored.
    pub fn init(network: impl Into<String>) {
        let _ = NETWORK.set(network.into());
    }

    pub fn up_time(seconds: f64) {
        KEEPER_UP_TIME.with_label_values(&[network()]).set(seconds);
    }

    pub fn signer_eth_balance(signer: &str, balance: f64) {
        KEEPER_SIGNER_ETH_BALANCE
            .with_label_values(&[network(), signer])
            .set(balance);
    }

    pub fn start_up() {
        KEEPER_START_UP.with_label_values(&[network()]).inc();
    }

    pub fn keeper_error(keeper: &str, market: &str) {
        KEEPER_ERROR
            .with_label_values(&[network(), keeper, market])
            .inc();
    }

    pub fn block_delta(delta: f64) {
        DISTRIBUTOR_BLOCK_DELTA
            .with_label_values(&[network()])
            .set(delta);
    }

    pub fn block_process_time(ms: f64) {
        DISTRIBUTOR_BLOCK_PROCESS_TIME
            .with_label_values(&[network()])
            .set(ms);
    }

    pub fn delayed_order_executed(market: &str) {
        DELAYED_ORDER_EXECUTED
            .with_label_values(&[network(), market])
            .inc();
    }

    pub fn delayed_order_already_executed(market: &str) {
        DELAYED_ORDER_ALREADY_EXECUTED
            .with_label_values(&[network(), market])
            .inc();
    }

    pub fn offchain_order_executed(market: &str) {
        OFFCHAIN_ORDER_EXECUTED
            .with_label_values(&[network(), market])
            .inc();
    }

    pub fn position_liquidated(market: &str) {
        POSITION_LIQUIDATED
            .with_label_values(&[network(), market])
            .inc();
    }

    pub fn signer_pool_size(size: usize) {
        SIGNER_POOL_SIZE
            .with_label_values(&[network()])
            .set(size as f64);
    }
}
