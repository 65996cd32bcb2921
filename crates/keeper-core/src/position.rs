//! Open-position index entries.

use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;

/// An open position, keyed by account in the keeper index.
///
/// An entry exists iff the last observed `PositionModified` for the account
/// carried non-zero margin and no subsequent `PositionLiquidated` or
/// `PositionFlagged` was seen.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub id: U256,
    pub account: Address,
    /// Signed size in natural units: long positive, short negative.
    pub size: Decimal,
    /// Notional leverage at the last modification: |size|·price / margin.
    pub leverage: Decimal,
    /// Last liquidation price read from the contract; `None` means unknown
    /// and due for a refresh.
    pub liq_price: Option<Decimal>,
    /// Chain timestamp of the last successful `liq_price` refresh.
    pub liq_price_updated_timestamp: u64,
}

impl Position {
    /// Build a position from a `PositionModified` event's fields.
    ///
    /// The liquidation price is unknown until the keeper refreshes it from
    /// the contract.
    pub fn from_modification(
        id: U256,
        account: Address,
        size: Decimal,
        margin: Decimal,
        last_price: Decimal,
    ) -> Self {
        let leverage = if margin.is_zero() {
            Decimal::ZERO
        } else {
            size.abs() * last_price / margin
        };
        Self {
            id,
            account,
            size,
            leverage,
            liq_price: None,
            liq_price_updated_timestamp: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.size.is_zero()
    }

    /// Relative distance between the known liquidation price and the current
    /// asset price: `|liq − price| / price`. `None` when the liquidation
    /// price is unknown or the asset price is zero.
    pub fn liq_distance(&self, asset_price: Decimal) -> Option<Decimal> {
        let liq = self.liq_price?;
        if asset_price.is_zero() {
            return None;
        }
        Some((liq - asset_price).abs() / asset_price)
    }
}
