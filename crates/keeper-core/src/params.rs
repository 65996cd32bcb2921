//! Tunables and economic knobs.
//!
//! The gas multipliers are economic headroom, not protocol constants; the
//! liquidation knobs bound how much refresh work one tick may generate.

use rust_decimal::Decimal;
use std::time::Duration;

/// Widest block range a single `eth_getLogs` query may cover.
pub const MAX_EVENT_BLOCK_RANGE: u64 = 50_000;

/// Cap on how many blocks one tick may process after downtime.
pub const MAX_BACKLOG: u64 = 200_000;

/// Per-execute batch size for concurrent per-account tasks.
pub const MAX_BATCH_SIZE: usize = 4;

/// Pause between batches within one `execute`.
pub const BATCH_WAIT_TIME: Duration = Duration::from_millis(500);

/// Gas-limit headroom applied on top of `estimateGas` (×1.2).
pub const GAS_LIMIT_HEADROOM_NUM: u64 = 12;
pub const GAS_LIMIT_HEADROOM_DEN: u64 = 10;

/// Gas-price headroom applied on top of `eth_gasPrice` (×2).
pub const GAS_PRICE_HEADROOM: u128 = 2;

/// One-confirmation wait budget for submitted transactions.
pub const TX_CONFIRM_TIMEOUT: Duration = Duration::from_secs(120);

/// Hard deadline for draining the current tick on shutdown.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Multicall3 page size for flag dry-runs and submissions.
pub const MULTICALL_PAGE_SIZE: usize = 20;

/// Apply the ×1.2 gas-limit headroom.
pub fn with_gas_headroom(estimate: u64) -> u64 {
    estimate.saturating_mul(GAS_LIMIT_HEADROOM_NUM) / GAS_LIMIT_HEADROOM_DEN
}

/// Liquidation candidate-selection knobs.
#[derive(Debug, Clone)]
pub struct LiquidationParams {
    /// Relative liq-price distance under which a position is "close".
    pub proximity_threshold: Decimal,
    /// Age after which a far liquidation price counts as outdated.
    pub far_price_recency_cutoff: Duration,
    /// Refresh budget for outdated far prices per tick.
    pub max_far_prices_to_update: usize,
}

impl Default for LiquidationParams {
    fn default() -> Self {
        Self {
            proximity_threshold: Decimal::new(5, 2), // 0.05
            far_price_recency_cutoff: Duration::from_secs(6 * 3600),
            max_far_prices_to_update: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gas_headroom_is_twenty_percent() {
        assert_eq!(with_gas_headroom(100_000), 120_000);
        assert_eq!(with_gas_headroom(0), 0);
    }

    #[test]
    fn default_liquidation_knobs() {
        let p = LiquidationParams::default();
        assert_eq!(p.proximity_threshold, Decimal::new(5, 2));
        assert_eq!(p.far_price_recency_cutoff.as_secs(), 21_600);
        assert_eq!(p.max_far_prices_to_update, 1);
    }
}
