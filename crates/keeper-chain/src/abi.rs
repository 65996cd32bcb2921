//! Contract surface declarations and log decoding.
//!
//! The engine never sees these types; decoding converts straight into
//! `keeper_core` events, with 1e18 fixed-point fields leaving chain units
//! at this boundary.

use alloy::primitives::U256;
use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::SolEventInterface;
use keeper_core::{wei, ChainEvent, EventPayload};

use crate::error::{ChainError, ChainResult};

sol! {
    /// A pending delayed order as stored by the market.
    #[derive(Debug)]
    struct StoredDelayedOrder {
        bool isOffchain;
        int128 sizeDelta;
        uint128 desiredFillPrice;
        uint128 targetRoundId;
        uint256 commitDeposit;
        uint256 keeperDeposit;
        uint256 executableAtTime;
        uint256 intentionTime;
        bytes32 trackingCode;
    }

    #[derive(Debug)]
    #[sol(rpc)]
    interface IPerpsV2Market {
        event FundingRecomputed(int256 funding, int256 fundingRate, uint256 index, uint256 timestamp);
        event PositionModified(
            uint256 indexed id,
            address indexed account,
            uint256 margin,
            int256 size,
            int256 tradeSize,
            uint256 lastPrice,
            uint256 fundingIndex,
            uint256 fee
        );
        event PositionLiquidated(uint256 id, address account, address liquidator, int256 size, uint256 price, uint256 fee);
        event PositionFlagged(uint256 id, address account, address flagger, uint256 price, uint256 timestamp);
        event DelayedOrderSubmitted(
            address indexed account,
            bool isOffchain,
            int256 sizeDelta,
            uint256 targetRoundId,
            uint256 intentionTime,
            uint256 executableAtTime,
            uint256 commitDeposit,
            uint256 keeperDeposit,
            bytes32 trackingCode
        );
        event DelayedOrderRemoved(
            address indexed account,
            bool isOffchain,
            uint256 currentRoundId,
            int256 sizeDelta,
            uint256 targetRoundId,
            uint256 commitDeposit,
            uint256 keeperDeposit,
            bytes32 trackingCode
        );

        function executeDelayedOrder(address account) external;
        function executeOffchainDelayedOrder(address account, bytes[] calldata priceUpdateData) external payable;
        function flagPosition(address account) external;
        function liquidatePosition(address account) external;
        function canLiquidate(address account) external view returns (bool);
        function isFlagged(address account) external view returns (bool);
        function liquidationPrice(address account) external view returns (uint256 price, bool invalid);
        function delayedOrders(address account) external view returns (StoredDelayedOrder memory);
        function assetPrice() external view returns (uint256 price, bool invalid);
        function baseAsset() external view returns (bytes32 key);
        function marketKey() external view returns (bytes32 key);
    }

    #[derive(Debug)]
    #[sol(rpc)]
    interface IExchangeRates {
        function getCurrentRoundId(bytes32 currencyKey) external view returns (uint256);
    }

    #[derive(Debug)]
    #[sol(rpc)]
    interface IPerpsV2ExchangeRate {
        function offchainPriceFeedId(bytes32 assetId) external view returns (bytes32);
    }

    #[derive(Debug)]
    #[sol(rpc)]
    interface IPyth {
        function getUpdateFee(bytes[] calldata updateData) external view returns (uint256 feeAmount);
    }

    /// Summary row of the PerpsV2 data contract.
    #[derive(Debug)]
    struct MarketSummaryRow {
        address market;
        bytes32 asset;
        bytes32 key;
        uint256 maxLeverage;
        uint256 price;
        uint256 marketSize;
        int256 marketSkew;
        uint256 marketDebt;
        int256 currentFundingRate;
        int256 currentFundingVelocity;
    }

    #[derive(Debug)]
    #[sol(rpc)]
    interface IPerpsV2MarketData {
        function allProxiedMarketSummaries() external view returns (MarketSummaryRow[] memory);
    }

    #[derive(Debug)]
    struct Call3Sol {
        address target;
        bool allowFailure;
        bytes callData;
    }

    #[derive(Debug)]
    struct Call3ResultSol {
        bool success;
        bytes returnData;
    }

    #[derive(Debug)]
    #[sol(rpc)]
    interface IMulticall3 {
        function aggregate3(Call3Sol[] calldata calls) external payable returns (Call3ResultSol[] memory returnData);
    }
}

fn to_u64(value: U256, field: &str) -> ChainResult<u64> {
    u64::try_from(value).map_err(|_| ChainError::Decode(format!("{field} overflows u64")))
}

/// Decode one RPC log into a keeper event.
///
/// Logs arrive pre-filtered by topic, so an undecodable log is a bug, not
/// an expected case.
pub fn decode_market_log(log: &Log) -> ChainResult<ChainEvent> {
    use IPerpsV2Market::IPerpsV2MarketEvents as Ev;

    let decoded = Ev::decode_log(&log.inner)
        .map_err(|e| ChainError::Decode(e.to_string()))?;

    let payload = match decoded.data {
        Ev::FundingRecomputed(e) => EventPayload::FundingRecomputed {
            timestamp: to_u64(e.timestamp, "timestamp")?,
        },
        Ev::PositionModified(e) => EventPayload::PositionModified {
            id: e.id,
            account: e.account,
            size: wei::from_signed_wei(e.size)?,
            margin: wei::from_wei(e.margin)?,
            last_price: wei::from_wei(e.lastPrice)?,
        },
        Ev::PositionLiquidated(e) => EventPayload::PositionLiquidated { account: e.account },
        Ev::PositionFlagged(e) => EventPayload::PositionFlagged { account: e.account },
        Ev::DelayedOrderSubmitted(e) => {
            let intention_time = to_u64(e.intentionTime, "intentionTime")?;
            EventPayload::DelayedOrderSubmitted {
                account: e.account,
                is_offchain: e.isOffchain,
                size_delta: wei::from_signed_wei(e.sizeDelta)?,
                target_round_id: to_u64(e.targetRoundId, "targetRoundId")?,
                intention_time: (intention_time > 0).then_some(intention_time),
                executable_at_time: to_u64(e.executableAtTime, "executableAtTime")?,
            }
        }
        Ev::DelayedOrderRemoved(e) => EventPayload::DelayedOrderRemoved {
            account: e.account,
            is_offchain: e.isOffchain,
        },
    };

    Ok(ChainEvent {
        payload,
        block_number: log.block_number.unwrap_or_default(),
        log_index: log.log_index.unwrap_or_default(),
        block_timestamp: log.block_timestamp,
    })
}
