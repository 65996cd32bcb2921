//! Conversions between 1e18 fixed-point chain units and `Decimal`.
//!
//! All PerpsV2 quantities (sizes, margins, prices) are emitted by the
//! contracts as 18-decimal fixed point. Economic decisions in the keeper
//! (leverage, liquidation distance) are made in `Decimal`, so values are
//! converted once at the decoding boundary and never mixed.

use alloy::primitives::{I256, U256};
use rust_decimal::Decimal;

use crate::error::{CoreError, Result};

/// Decimal places of the chain's fixed-point unit (1e18).
pub const UNIT_DECIMALS: u32 = 18;

/// Convert an unsigned 1e18 fixed-point value to a `Decimal`.
///
/// Fails when the value exceeds the 96-bit mantissa `Decimal` can carry
/// (~7.9e28, i.e. ~7.9e10 whole units); such values do not occur for sane
/// market quantities and indicate a decoding bug upstream.
pub fn from_wei(value: U256) -> Result<Decimal> {
    let raw: i128 = i128::try_from(value)
        .map_err(|_| CoreError::WeiOutOfRange(value.to_string()))?;
    Decimal::try_from_i128_with_scale(raw, UNIT_DECIMALS)
        .map_err(|_| CoreError::WeiOutOfRange(value.to_string()))
}

/// Convert a signed 1e18 fixed-point value to a `Decimal`.
pub fn from_signed_wei(value: I256) -> Result<Decimal> {
    let raw: i128 = i128::try_from(value)
        .map_err(|_| CoreError::WeiOutOfRange(value.to_string()))?;
    Decimal::try_from_i128_with_scale(raw, UNIT_DECIMALS)
        .map_err(|_| CoreError::WeiOutOfRange(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn converts_whole_units() {
        let v = U256::from(10u64) * U256::from(10u64).pow(U256::from(18));
        assert_eq!(from_wei(v).unwrap().normalize(), dec!(10));
    }

    #[test]
    fn converts_fractional_units() {
        // 1.5e18
        let v = U256::from(1_500_000_000_000_000_000u64);
        assert_eq!(from_wei(v).unwrap().normalize(), dec!(1.5));
    }

    #[test]
    fn converts_negative_sizes() {
        let v = I256::try_from(-2_000_000_000_000_000_000i128).unwrap();
        assert_eq!(from_signed_wei(v).unwrap().normalize(), dec!(-2));
    }

    #[test]
    fn rejects_values_beyond_mantissa() {
        let v = U256::MAX;
        assert!(matches!(from_wei(v), Err(CoreError::WeiOutOfRange(_))));
    }
}
