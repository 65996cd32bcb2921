//! Environment-variable configuration.

use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;

use crate::error::{AppError, AppResult};

/// The universal Multicall3 deployment address.
const MULTICALL3_DEFAULT: &str = "0xcA11bde05977b3631167028862bE2a173976CA11";

/// Supported networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Optimism,
    OptimismGoerli,
}

impl Network {
    /// Metric/log dimension for this network.
    pub fn label(&self) -> &'static str {
        match self {
            Network::Optimism => "optimism",
            Network::OptimismGoerli => "optimism-goerli",
        }
    }

    fn infura_url(&self, key: &str) -> String {
        match self {
            Network::Optimism => format!("https://optimism-mainnet.infura.io/v3/{key}"),
            Network::OptimismGoerli => format!("https://optimism-goerli.infura.io/v3/{key}"),
        }
    }

    fn alchemy_url(&self, key: &str) -> String {
        match self {
            Network::Optimism => format!("https://opt-mainnet.g.alchemy.com/v2/{key}"),
            Network::OptimismGoerli => format!("https://opt-goerli.g.alchemy.com/v2/{key}"),
        }
    }
}

impl FromStr for Network {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "optimism" => Ok(Network::Optimism),
            "optimism-goerli" => Ok(Network::OptimismGoerli),
            other => Err(AppError::Config(format!("unsupported NETWORK: {other}"))),
        }
    }
}

/// Keeper configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub network: Network,
    pub mnemonic: String,
    pub signer_pool_size: usize,
    pub provider_api_key_infura: Option<String>,
    pub provider_api_key_alchemy: Option<String>,
    /// First block to index on a cold start.
    pub from_block: u64,
    pub process_interval: Duration,
    pub max_order_exec_attempts: u32,
    pub pyth_price_server: String,
    pub metrics_enabled: bool,
    pub log_level: String,
    /// Contract address book; required because the keeper does not carry a
    /// protocol resolver.
    pub market_data_address: Address,
    pub exchange_rates_address: Address,
    pub perps_exchange_rate_address: Address,
    pub pyth_contract_address: Address,
    /// Multicall3; set empty to disable the batched flag path.
    pub multicall3_address: Option<Address>,
}

fn required(name: &str) -> AppResult<String> {
    std::env::var(name).map_err(|_| AppError::Config(format!("{name} is required")))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse<T>(name: &str, raw: &str) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| AppError::Config(format!("{name} is invalid: {e}")))
}

fn required_address(name: &str) -> AppResult<Address> {
    let raw = required(name)?;
    parse(name, &raw)
}

/// Resolve the Multicall3 address: an unset var falls back to the
/// universal deployment; setting it to an empty string opts out of the
/// batched flag path entirely.
fn multicall3_from(raw: Option<String>) -> AppResult<Option<Address>> {
    match raw {
        Some(raw) if raw.is_empty() => Ok(None),
        Some(raw) => Ok(Some(parse("MULTICALL3_ADDRESS", &raw)?)),
        None => Ok(Some(parse("MULTICALL3_ADDRESS", MULTICALL3_DEFAULT)?)),
    }
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        let network: Network = required("NETWORK")?.parse()?;
        let mnemonic = required("ETH_HDWALLET_MNEMONIC")?;

        let signer_pool_size: usize = parse("SIGNER_POOL_SIZE", &required("SIGNER_POOL_SIZE")?)?;
        if signer_pool_size == 0 {
            return Err(AppError::Config("SIGNER_POOL_SIZE must be >= 1".into()));
        }

        let provider_api_key_infura = optional("PROVIDER_API_KEY_INFURA");
        let provider_api_key_alchemy = optional("PROVIDER_API_KEY_ALCHEMY");
        if provider_api_key_infura.is_none() && provider_api_key_alchemy.is_none() {
            return Err(AppError::Config(
                "PROVIDER_API_KEY_INFURA or PROVIDER_API_KEY_ALCHEMY is required".into(),
            ));
        }

        let from_block: u64 = parse("FROM_BLOCK", &required("FROM_BLOCK")?)?;
        let interval_ms: u64 = parse(
            "DISTRIBUTOR_PROCESS_INTERVAL",
            &required("DISTRIBUTOR_PROCESS_INTERVAL")?,
        )?;
        let max_order_exec_attempts: u32 = parse(
            "MAX_ORDER_EXEC_ATTEMPTS",
            &required("MAX_ORDER_EXEC_ATTEMPTS")?,
        )?;
        let pyth_price_server = required("PYTH_PRICE_SERVER")?;
        let metrics_enabled = optional("METRICS_ENABLED").as_deref() == Some("1");
        let log_level = optional("LOG_LEVEL").unwrap_or_else(|| "info".to_owned());

        let multicall3_address = multicall3_from(std::env::var("MULTICALL3_ADDRESS").ok())?;

        Ok(Self {
            network,
            mnemonic,
            signer_pool_size,
            provider_api_key_infura,
            provider_api_key_alchemy,
            from_block,
            process_interval: Duration::from_millis(interval_ms),
            max_order_exec_attempts,
            pyth_price_server,
            metrics_enabled,
            log_level,
            market_data_address: required_address("MARKET_DATA_ADDRESS")?,
            exchange_rates_address: required_address("EXCHANGE_RATES_ADDRESS")?,
            perps_exchange_rate_address: required_address("PERPS_EXCHANGE_RATE_ADDRESS")?,
            pyth_contract_address: required_address("PYTH_CONTRACT_ADDRESS")?,
            multicall3_address,
        })
    }

    /// Resolve the RPC endpoint, preferring Infura when both keys are set.
    pub fn rpc_url(&self) -> AppResult<String> {
        if let Some(key) = &self.provider_api_key_infura {
            return Ok(self.network.infura_url(key));
        }
        if let Some(key) = &self.provider_api_key_alchemy {
            return Ok(self.network.alchemy_url(key));
        }
        Err(AppError::Config("no RPC provider key configured".into()))
    }
}
