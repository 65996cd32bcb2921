//! Alloy-backed implementations of the chain capability traits.
//!
//! Providers are expected to be built with retry/backoff transport layers
//! and a wallet filler carrying every pool signer; `TxOptions::from`
//! selects the signing key per submission.

use alloy::network::Ethereum;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{PendingTransactionBuilder, Provider};
use alloy::rpc::types::{BlockNumberOrTag, Filter};
use alloy::sol_types::{SolCall, SolEvent};
use keeper_core::{wei, ChainEvent, EventKind, MarketKey};
use rust_decimal::Decimal;

use crate::abi::{
    self, Call3ResultSol, Call3Sol, IExchangeRates, IMulticall3, IPerpsV2ExchangeRate,
    IPerpsV2Market, IPerpsV2MarketData, IPyth,
};
use crate::client::{BlockInfo, BoxFuture, ChainClient};
use crate::contract::{
    MarketCall, MarketContract, MarketDirectory, MarketSummary, OnchainDelayedOrder, PendingTx,
    PythContract, TxOptions, TxOutcome,
};
use crate::error::{ChainError, ChainResult};
use crate::multicall::{Call3, Call3Result, Multicall};

fn rpc_err(e: impl std::fmt::Display) -> ChainError {
    ChainError::Rpc(e.to_string())
}

fn to_u64(value: U256, field: &str) -> ChainResult<u64> {
    u64::try_from(value).map_err(|_| ChainError::Decode(format!("{field} overflows u64")))
}

/// Right-pad an ASCII currency key into bytes32, contract-style.
pub fn encode_bytes32_str(s: &str) -> B256 {
    let mut raw = [0u8; 32];
    let bytes = s.as_bytes();
    let n = bytes.len().min(32);
    raw[..n].copy_from_slice(&bytes[..n]);
    B256::from(raw)
}

fn decode_bytes32_str(raw: B256) -> String {
    let trimmed: Vec<u8> = raw.iter().copied().take_while(|b| *b != 0).collect();
    String::from_utf8_lossy(&trimmed).into_owned()
}

fn topic0(kind: EventKind) -> B256 {
    use IPerpsV2Market as M;
    match kind {
        EventKind::FundingRecomputed => M::FundingRecomputed::SIGNATURE_HASH,
        EventKind::PositionModified => M::PositionModified::SIGNATURE_HASH,
        EventKind::PositionLiquidated => M::PositionLiquidated::SIGNATURE_HASH,
        EventKind::PositionFlagged => M::PositionFlagged::SIGNATURE_HASH,
        EventKind::DelayedOrderSubmitted => M::DelayedOrderSubmitted::SIGNATURE_HASH,
        EventKind::DelayedOrderRemoved => M::DelayedOrderRemoved::SIGNATURE_HASH,
    }
}

fn wrap_pending(pending: PendingTransactionBuilder<Ethereum>) -> PendingTx {
    let hash = *pending.tx_hash();
    PendingTx::new(
        hash,
        Box::pin(async move {
            let receipt = pending.get_receipt().await.map_err(rpc_err)?;
            if !receipt.status() {
                return Err(ChainError::Reverted(hash));
            }
            Ok(TxOutcome {
                hash,
                block_number: receipt.block_number.unwrap_or_default(),
                success: true,
            })
        }),
    )
}

/// Apply caller-decided submission parameters to a call builder and send.
macro_rules! send_with_opts {
    ($builder:expr, $opts:expr) => {{
        let mut b = $builder
            .from($opts.from)
            .nonce($opts.nonce)
            .value($opts.value);
        if let Some(gas) = $opts.gas_limit {
            b = b.gas(gas);
        }
        if let Some(price) = $opts.gas_price {
            b = b.gas_price(price);
        }
        b.send().await
    }};
}

// ============================================================================
// RpcChainClient
// ============================================================================

/// [`ChainClient`] over an alloy provider.
#[derive(Clone)]
pub struct RpcChainClient<P> {
    provider: P,
}

impl<P> RpcChainClient<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<P> ChainClient for RpcChainClient<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    fn block_number(&self) -> BoxFuture<'_, ChainResult<u64>> {
        Box::pin(async move { self.provider.get_block_number().await.map_err(rpc_err) })
    }

    fn block(&self, number: u64) -> BoxFuture<'_, ChainResult<BlockInfo>> {
        Box::pin(async move {
            let block = self
                .provider
                .get_block_by_number(BlockNumberOrTag::Number(number))
                .await
                .map_err(rpc_err)?
                .ok_or(ChainError::BlockNotAvailable(number))?;
            Ok(BlockInfo {
                number,
                timestamp: block.header.timestamp,
            })
        })
    }

    fn latest_block(&self) -> BoxFuture<'_, ChainResult<BlockInfo>> {
        Box::pin(async move {
            let block = self
                .provider
                .get_block_by_number(BlockNumberOrTag::Latest)
                .await
                .map_err(rpc_err)?
                .ok_or(ChainError::BlockNotAvailable(0))?;
            Ok(BlockInfo {
                number: block.header.number,
                timestamp: block.header.timestamp,
            })
        })
    }

    fn gas_price(&self) -> BoxFuture<'_, ChainResult<u128>> {
        Box::pin(async move { self.provider.get_gas_price().await.map_err(rpc_err) })
    }

    fn transaction_count(&self, account: Address) -> BoxFuture<'_, ChainResult<u64>> {
        Box::pin(async move {
            self.provider
                .get_transaction_count(account)
                .await
                .map_err(rpc_err)
        })
    }

    fn balance(&self, account: Address) -> BoxFuture<'_, ChainResult<U256>> {
        Box::pin(async move { self.provider.get_balance(account).await.map_err(rpc_err) })
    }

    fn get_events<'a>(
        &'a self,
        contract: Address,
        kinds: &'a [EventKind],
        from_block: u64,
        to_block: u64,
    ) -> BoxFuture<'a, ChainResult<Vec<ChainEvent>>> {
        Box::pin(async move {
            let topics: Vec<B256> = kinds.iter().copied().map(topic0).collect();
            let filter = Filter::new()
                .address(contract)
                .event_signature(topics)
                .from_block(from_block)
                .to_block(to_block);
            let logs = self.provider.get_logs(&filter).await.map_err(rpc_err)?;
            logs.iter().map(abi::decode_market_log).collect()
        })
    }
}

// ============================================================================
// RpcMarketContract
// ============================================================================

/// [`MarketContract`] over a proxied PerpsV2 market plus the rates contracts.
pub struct RpcMarketContract<P: Provider + Clone + Send + Sync + 'static> {
    market_key: MarketKey,
    asset_key: B256,
    market: IPerpsV2Market::IPerpsV2MarketInstance<P>,
    exchange_rates: IExchangeRates::IExchangeRatesInstance<P>,
    perps_exchange_rate: IPerpsV2ExchangeRate::IPerpsV2ExchangeRateInstance<P>,
}

impl<P: Provider + Clone + Send + Sync + 'static> RpcMarketContract<P> {
    pub fn new(
        provider: P,
        market_key: MarketKey,
        asset: &str,
        market_address: Address,
        exchange_rates_address: Address,
        perps_exchange_rate_address: Address,
    ) -> Self {
        Self {
            market_key,
            asset_key: encode_bytes32_str(asset),
            market: IPerpsV2Market::new(market_address, provider.clone()),
            exchange_rates: IExchangeRates::new(exchange_rates_address, provider.clone()),
            perps_exchange_rate: IPerpsV2ExchangeRate::new(perps_exchange_rate_address, provider),
        }
    }
}

impl<P: Provider + Clone + Send + Sync + 'static> MarketContract for RpcMarketContract<P> {
    fn address(&self) -> Address {
        *self.market.address()
    }

    fn market_key(&self) -> &MarketKey {
        &self.market_key
    }

    fn current_round_id(&self) -> BoxFuture<'_, ChainResult<u64>> {
        Box::pin(async move {
            let round = self
                .exchange_rates
                .getCurrentRoundId(self.asset_key)
                .call()
                .await
                .map_err(rpc_err)?;
            to_u64(round, "currentRoundId")
        })
    }

    fn asset_price(&self) -> BoxFuture<'_, ChainResult<Decimal>> {
        Box::pin(async move {
            let ret = self.market.assetPrice().call().await.map_err(rpc_err)?;
            if ret.invalid {
                return Err(ChainError::Decode("asset price flagged invalid".into()));
            }
            Ok(wei::from_wei(ret.price)?)
        })
    }

    fn offchain_price_feed_id(&self) -> BoxFuture<'_, ChainResult<B256>> {
        Box::pin(async move {
            self.perps_exchange_rate
                .offchainPriceFeedId(self.asset_key)
                .call()
                .await
                .map_err(rpc_err)
        })
    }

    fn delayed_order(&self, account: Address) -> BoxFuture<'_, ChainResult<OnchainDelayedOrder>> {
        Box::pin(async move {
            let stored = self
                .market
                .delayedOrders(account)
                .call()
                .await
                .map_err(rpc_err)?;
            Ok(OnchainDelayedOrder {
                size_delta_is_zero: stored.sizeDelta == 0,
                target_round_id: u64::try_from(stored.targetRoundId)
                    .map_err(|_| ChainError::Decode("targetRoundId overflows u64".into()))?,
                executable_at_time: to_u64(stored.executableAtTime, "executableAtTime")?,
                intention_time: to_u64(stored.intentionTime, "intentionTime")?,
            })
        })
    }

    fn can_liquidate(&self, account: Address) -> BoxFuture<'_, ChainResult<bool>> {
        Box::pin(async move {
            self.market
                .canLiquidate(account)
                .call()
                .await
                .map_err(rpc_err)
        })
    }

    fn is_flagged(&self, account: Address) -> BoxFuture<'_, ChainResult<bool>> {
        Box::pin(async move { self.market.isFlagged(account).call().await.map_err(rpc_err) })
    }

    fn liquidation_price(&self, account: Address) -> BoxFuture<'_, ChainResult<Decimal>> {
        Box::pin(async move {
            let ret = self
                .market
                .liquidationPrice(account)
                .call()
                .await
                .map_err(rpc_err)?;
            if ret.invalid {
                return Err(ChainError::Decode("liquidation price flagged invalid".into()));
            }
            Ok(wei::from_wei(ret.price)?)
        })
    }

    fn estimate_gas(&self, call: &MarketCall) -> BoxFuture<'_, ChainResult<u64>> {
        let call = call.clone();
        Box::pin(async move {
            let result = match call {
                MarketCall::ExecuteDelayedOrder(account) => {
                    self.market.executeDelayedOrder(account).estimate_gas().await
                }
                MarketCall::ExecuteOffchainDelayedOrder(account, data) => {
                    self.market
                        .executeOffchainDelayedOrder(account, data)
                        .estimate_gas()
                        .await
                }
                MarketCall::FlagPosition(account) => {
                    self.market.flagPosition(account).estimate_gas().await
                }
                MarketCall::LiquidatePosition(account) => {
                    self.market.liquidatePosition(account).estimate_gas().await
                }
            };
            result.map_err(rpc_err)
        })
    }

    fn submit(&self, call: MarketCall, opts: TxOptions) -> BoxFuture<'_, ChainResult<PendingTx>> {
        Box::pin(async move {
            let pending = match call {
                MarketCall::ExecuteDelayedOrder(account) => {
                    send_with_opts!(self.market.executeDelayedOrder(account), opts)
                }
                MarketCall::ExecuteOffchainDelayedOrder(account, data) => {
                    send_with_opts!(self.market.executeOffchainDelayedOrder(account, data), opts)
                }
                MarketCall::FlagPosition(account) => {
                    send_with_opts!(self.market.flagPosition(account), opts)
                }
                MarketCall::LiquidatePosition(account) => {
                    send_with_opts!(self.market.liquidatePosition(account), opts)
                }
            }
            .map_err(rpc_err)?;
            Ok(wrap_pending(pending))
        })
    }

    fn encode_call(&self, call: &MarketCall) -> Bytes {
        match call {
            MarketCall::ExecuteDelayedOrder(account) => {
                IPerpsV2Market::executeDelayedOrderCall { account: *account }
                    .abi_encode()
                    .into()
            }
            MarketCall::ExecuteOffchainDelayedOrder(account, data) => {
                IPerpsV2Market::executeOffchainDelayedOrderCall {
                    account: *account,
                    priceUpdateData: data.clone(),
                }
                .abi_encode()
                .into()
            }
            MarketCall::FlagPosition(account) => {
                IPerpsV2Market::flagPositionCall { account: *account }
                    .abi_encode()
                    .into()
            }
            MarketCall::LiquidatePosition(account) => {
                IPerpsV2Market::liquidatePositionCall { account: *account }
                    .abi_encode()
                    .into()
            }
        }
    }
}

// ============================================================================
// RpcMulticall
// ============================================================================

/// [`Multicall`] over a deployed Multicall3.
pub struct RpcMulticall<P: Provider + Clone + Send + Sync + 'static> {
    multicall: IMulticall3::IMulticall3Instance<P>,
}

impl<P: Provider + Clone + Send + Sync + 'static> RpcMulticall<P> {
    pub fn new(provider: P, address: Address) -> Self {
        Self {
            multicall: IMulticall3::new(address, provider),
        }
    }
}

fn to_sol_calls(calls: Vec<Call3>) -> Vec<Call3Sol> {
    calls
        .into_iter()
        .map(|c| Call3Sol {
            target: c.target,
            allowFailure: c.allow_failure,
            callData: c.calldata,
        })
        .collect()
}

impl<P: Provider + Clone + Send + Sync + 'static> Multicall for RpcMulticall<P> {
    fn dry_run(&self, calls: Vec<Call3>) -> BoxFuture<'_, ChainResult<Vec<Call3Result>>> {
        Box::pin(async move {
            let results: Vec<Call3ResultSol> = self
                .multicall
                .aggregate3(to_sol_calls(calls))
                .call()
                .await
                .map_err(rpc_err)?;
            Ok(results
                .into_iter()
                .map(|r| Call3Result {
                    success: r.success,
                    return_data: r.returnData,
                })
                .collect())
        })
    }

    fn estimate_gas(&self, calls: Vec<Call3>) -> BoxFuture<'_, ChainResult<u64>> {
        Box::pin(async move {
            self.multicall
                .aggregate3(to_sol_calls(calls))
                .estimate_gas()
                .await
                .map_err(rpc_err)
        })
    }

    fn submit(&self, calls: Vec<Call3>, opts: TxOptions) -> BoxFuture<'_, ChainResult<PendingTx>> {
        Box::pin(async move {
            let pending = send_with_opts!(self.multicall.aggregate3(to_sol_calls(calls)), opts)
                .map_err(rpc_err)?;
            Ok(wrap_pending(pending))
        })
    }
}

// ============================================================================
// RpcPythContract / RpcMarketDirectory
// ============================================================================

/// [`PythContract`] over the deployed Pyth endpoint.
pub struct RpcPythContract<P: Provider + Clone + Send + Sync + 'static> {
    pyth: IPyth::IPythInstance<P>,
}

impl<P: Provider + Clone + Send + Sync + 'static> RpcPythContract<P> {
    pub fn new(provider: P, address: Address) -> Self {
        Self {
            pyth: IPyth::new(address, provider),
        }
    }
}

impl<P: Provider + Clone + Send + Sync + 'static> PythContract for RpcPythContract<P> {
    fn update_fee<'a>(&'a self, update_data: &'a [Bytes]) -> BoxFuture<'a, ChainResult<U256>> {
        Box::pin(async move {
            self.pyth
                .getUpdateFee(update_data.to_vec())
                .call()
                .await
                .map_err(rpc_err)
        })
    }
}

/// [`MarketDirectory`] over the PerpsV2 data contract.
pub struct RpcMarketDirectory<P: Provider + Clone + Send + Sync + 'static> {
    data: IPerpsV2MarketData::IPerpsV2MarketDataInstance<P>,
}

impl<P: Provider + Clone + Send + Sync + 'static> RpcMarketDirectory<P> {
    pub fn new(provider: P, address: Address) -> Self {
        Self {
            data: IPerpsV2MarketData::new(address, provider),
        }
    }
}

impl<P: Provider + Clone + Send + Sync + 'static> MarketDirectory for RpcMarketDirectory<P> {
    fn all_market_summaries(&self) -> BoxFuture<'_, ChainResult<Vec<MarketSummary>>> {
        Box::pin(async move {
            let rows = self
                .data
                .allProxiedMarketSummaries()
                .call()
                .await
                .map_err(rpc_err)?;
            rows.into_iter()
                .map(|row| {
                    Ok(MarketSummary {
                        address: row.market,
                        asset: decode_bytes32_str(row.asset),
                        key: MarketKey::from_bytes32(row.key),
                        price: wei::from_wei(row.price)?,
                    })
                })
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes32_roundtrip() {
        let raw = encode_bytes32_str("sETH");
        assert_eq!(decode_bytes32_str(raw), "sETH");
    }

    #[test]
    fn event_topics_are_distinct() {
        let topics: Vec<B256> = EventKind::ALL.iter().copied().map(topic0).collect();
        let mut dedup = topics.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(topics.len(), dedup.len());
    }

    #[test]
    fn flag_encoding_has_selector_prefix() {
        let call = IPerpsV2Market::flagPositionCall {
            account: Address::repeat_byte(0x11),
        };
        let encoded = call.abi_encode();
        // 4-byte selector + one padded address argument
        assert_eq!(encoded.len(), 4 + 32);
    }
}
