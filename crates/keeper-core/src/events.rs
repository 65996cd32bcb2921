//! Decoded contract events and their chain coordinates.

use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;

/// The event kinds the keeper understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    FundingRecomputed,
    PositionModified,
    PositionLiquidated,
    PositionFlagged,
    DelayedOrderSubmitted,
    DelayedOrderRemoved,
}

impl EventKind {
    /// All kinds, in declaration order.
    pub const ALL: [EventKind; 6] = [
        EventKind::FundingRecomputed,
        EventKind::PositionModified,
        EventKind::PositionLiquidated,
        EventKind::PositionFlagged,
        EventKind::DelayedOrderSubmitted,
        EventKind::DelayedOrderRemoved,
    ];
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::FundingRecomputed => "FundingRecomputed",
            EventKind::PositionModified => "PositionModified",
            EventKind::PositionLiquidated => "PositionLiquidated",
            EventKind::PositionFlagged => "PositionFlagged",
            EventKind::DelayedOrderSubmitted => "DelayedOrderSubmitted",
            EventKind::DelayedOrderRemoved => "DelayedOrderRemoved",
        };
        f.write_str(s)
    }
}

/// Typed event arguments.
///
/// Quantities that feed economic decisions are converted out of 1e18
/// fixed point at the decoding boundary (see [`crate::wei`]); identifiers
/// and raw deposits stay in chain units.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    FundingRecomputed {
        timestamp: u64,
    },
    PositionModified {
        id: U256,
        account: Address,
        /// Signed position size in natural units (long positive).
        size: Decimal,
        /// Remaining margin in natural units; zero means the position closed.
        margin: Decimal,
        /// Fill price in natural units.
        last_price: Decimal,
    },
    PositionLiquidated {
        account: Address,
    },
    PositionFlagged {
        account: Address,
    },
    DelayedOrderSubmitted {
        account: Address,
        is_offchain: bool,
        /// Signed size delta of the pending order.
        size_delta: Decimal,
        target_round_id: u64,
        /// Submission time as reported by the contract; absent on some
        /// deployments, in which case the block timestamp is used.
        intention_time: Option<u64>,
        executable_at_time: u64,
    },
    DelayedOrderRemoved {
        account: Address,
        is_offchain: bool,
    },
}

impl EventPayload {
    /// The kind tag for this payload.
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::FundingRecomputed { .. } => EventKind::FundingRecomputed,
            EventPayload::PositionModified { .. } => EventKind::PositionModified,
            EventPayload::PositionLiquidated { .. } => EventKind::PositionLiquidated,
            EventPayload::PositionFlagged { .. } => EventKind::PositionFlagged,
            EventPayload::DelayedOrderSubmitted { .. } => EventKind::DelayedOrderSubmitted,
            EventPayload::DelayedOrderRemoved { .. } => EventKind::DelayedOrderRemoved,
        }
    }
}

/// A decoded contract event with the coordinates needed for ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainEvent {
    pub payload: EventPayload,
    pub block_number: u64,
    pub log_index: u64,
    /// Present when the RPC provider returns timestamps with logs.
    pub block_timestamp: Option<u64>,
}

impl ChainEvent {
    /// Ascending `(block_number, log_index)` — the scan order contract.
    pub fn ordering_key(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}
