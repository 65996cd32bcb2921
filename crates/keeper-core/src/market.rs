//! Market identity.

use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical market key, e.g. `sETHPERP`.
///
/// The key is the contract's `marketKey` bytes32 rendered as a trimmed
/// UTF-8 string; it doubles as the metric/log label for the market.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketKey(pub String);

impl MarketKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Decode a right-padded bytes32 key as emitted by the contracts.
    pub fn from_bytes32(raw: B256) -> Self {
        let trimmed: Vec<u8> = raw.iter().copied().take_while(|b| *b != 0).collect();
        Self(String::from_utf8_lossy(&trimmed).into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A perps market the keeper operates on; one-to-one with a keeper set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Market {
    pub key: MarketKey,
    /// Underlying asset code, e.g. `sETH` (drives price lookups).
    pub asset: String,
    /// Market contract address.
    pub address: Address,
    /// Base asset without the synth prefix, e.g. `ETH`.
    pub base_asset: String,
    /// Pyth feed id for the off-chain execution path, when configured.
    pub price_feed_id: Option<B256>,
}

impl Market {
    pub fn new(
        key: MarketKey,
        asset: impl Into<String>,
        address: Address,
    ) -> Self {
        let asset = asset.into();
        let base_asset = asset.trim_start_matches('s').to_owned();
        Self {
            key,
            asset,
            address,
            base_asset,
            price_feed_id: None,
        }
    }

    pub fn with_price_feed(mut self, feed_id: B256) -> Self {
        self.price_feed_id = Some(feed_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_padded_bytes32_key() {
        let mut raw = [0u8; 32];
        raw[..8].copy_from_slice(b"sETHPERP");
        assert_eq!(MarketKey::from_bytes32(B256::from(raw)).as_str(), "sETHPERP");
    }

    #[test]
    fn base_asset_strips_synth_prefix() {
        let m = Market::new(MarketKey::new("sBTCPERP"), "sBTC", Address::ZERO);
        assert_eq!(m.base_asset, "BTC");
    }
}
