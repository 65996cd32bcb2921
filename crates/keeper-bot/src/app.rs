//! Application wiring: providers, contracts, keepers, lifecycle.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256};
use alloy::providers::ProviderBuilder;
use keeper_chain::rpc::{
    RpcChainClient, RpcMarketContract, RpcMarketDirectory, RpcMulticall, RpcPythContract,
};
use keeper_chain::{
    ChainClient, EventSource, EventSourceConfig, MarketContract, MarketDirectory, Multicall,
};
use keeper_core::params::LiquidationParams;
use keeper_core::Market;
use keeper_engine::{
    DelayedKeeperConfig, DelayedOrdersKeeper, Distributor, DistributorConfig, Keeper, KeeperDeps,
    LiquidationKeeper, LogNotifier, OffchainPricing,
};
use keeper_pyth::PythPriceClient;
use keeper_signer::{build_wallet, derive_signers, SignerPool, SignerPoolConfig};
use keeper_telemetry::Metrics;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Cadence of the per-signer balance gauge refresh.
const BALANCE_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Balance below which a signer is warned about, in wei (0.01 ETH).
const LOW_BALANCE_WEI: u128 = 10_000_000_000_000_000;

/// A bootstrapped keeper process, ready to run.
pub struct Application {
    config: Config,
    chain: Arc<dyn ChainClient>,
    pool: Arc<SignerPool>,
    distributor: Distributor,
}

impl Application {
    /// Build every collaborator and discover markets. Failures here are
    /// fatal startup errors (exit code 1).
    pub async fn bootstrap(config: Config) -> AppResult<Self> {
        Metrics::init(config.network.label());
        Metrics::start_up();

        let signers = derive_signers(&config.mnemonic, config.signer_pool_size)?;
        let wallet = build_wallet(&signers)?;
        Metrics::signer_pool_size(signers.len());

        let url = config.rpc_url()?;
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect(&url)
            .await
            .map_err(|e| AppError::Provider(format!("failed to connect provider: {e}")))?;

        let chain: Arc<dyn ChainClient> = Arc::new(RpcChainClient::new(provider.clone()));

        // Prove the RPC is reachable before anything else spins up.
        let tip = chain.block_number().await?;
        info!(network = config.network.label(), tip, "Connected to chain");

        let pool = Arc::new(SignerPool::new(
            Arc::clone(&chain),
            &signers,
            SignerPoolConfig::default(),
        ));
        let deps = KeeperDeps {
            chain: Arc::clone(&chain),
            pool: Arc::clone(&pool),
            notifier: Arc::new(LogNotifier),
        };

        let directory = RpcMarketDirectory::new(provider.clone(), config.market_data_address);
        let summaries = directory.all_market_summaries().await?;
        info!(markets = summaries.len(), "Discovered markets");

        let pyth_client = Arc::new(PythPriceClient::new(&config.pyth_price_server)?);
        let pyth_contract = Arc::new(RpcPythContract::new(
            provider.clone(),
            config.pyth_contract_address,
        ));
        let multicall: Option<Arc<dyn Multicall>> = config
            .multicall3_address
            .map(|address| Arc::new(RpcMulticall::new(provider.clone(), address)) as _);

        let order_config = DelayedKeeperConfig {
            max_exec_attempts: config.max_order_exec_attempts,
        };

        let mut keepers: Vec<Box<dyn Keeper>> = Vec::new();
        for summary in summaries {
            let contract: Arc<dyn MarketContract> = Arc::new(RpcMarketContract::new(
                provider.clone(),
                summary.key.clone(),
                &summary.asset,
                summary.address,
                config.exchange_rates_address,
                config.perps_exchange_rate_address,
            ));
            let market = Market::new(summary.key.clone(), &summary.asset, summary.address);

            keepers.push(Box::new(DelayedOrdersKeeper::onchain(
                market.clone(),
                Arc::clone(&contract),
                deps.clone(),
                order_config.clone(),
            )));

            match contract.offchain_price_feed_id().await {
                Ok(feed_id) if feed_id != B256::ZERO => {
                    keepers.push(Box::new(DelayedOrdersKeeper::offchain(
                        market.clone().with_price_feed(feed_id),
                        Arc::clone(&contract),
                        deps.clone(),
                        order_config.clone(),
                        OffchainPricing {
                            price_service: Arc::clone(&pyth_client) as _,
                            pyth_contract: Arc::clone(&pyth_contract) as _,
                            feed_id,
                        },
                    )));
                }
                Ok(_) => {
                    warn!(market = %market.key, "No Pyth feed configured; off-chain keeper skipped")
                }
                Err(e) => {
                    warn!(market = %market.key, error = %e, "Feed id lookup failed; off-chain keeper skipped")
                }
            }

            keepers.push(Box::new(LiquidationKeeper::new(
                market,
                contract,
                deps.clone(),
                multicall.clone(),
                LiquidationParams::default(),
            )));
        }

        let source = EventSource::new(Arc::clone(&chain), EventSourceConfig::default());
        let distributor = Distributor::new(
            Arc::clone(&chain),
            source,
            keepers,
            None,
            DistributorConfig {
                process_interval: config.process_interval,
                ..DistributorConfig::default()
            },
            config.from_block,
        );

        Ok(Self {
            config,
            chain,
            pool,
            distributor,
        })
    }

    /// Run until ctrl-c. Errors here are unrecoverable runtime errors
    /// (exit code 2).
    pub async fn run(mut self) -> AppResult<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
        });

        if self.config.metrics_enabled {
            let chain = Arc::clone(&self.chain);
            let addresses: Vec<Address> = self.pool.addresses().to_vec();
            tokio::spawn(balance_watcher(chain, addresses));
        }

        info!(
            interval_ms = self.config.process_interval.as_millis() as u64,
            from_block = self.config.from_block,
            "Starting distributor"
        );
        self.distributor.run(shutdown_rx).await?;
        Ok(())
    }
}

/// Periodically refresh the per-signer ETH balance gauge and warn when a
/// key is running dry; a drained signer stops earning silently otherwise.
async fn balance_watcher(chain: Arc<dyn ChainClient>, addresses: Vec<Address>) {
    let mut interval = tokio::time::interval(BALANCE_REFRESH_INTERVAL);
    loop {
        interval.tick().await;
        for address in &addresses {
            match chain.balance(*address).await {
                Ok(balance) => {
                    let wei = u128::try_from(balance).unwrap_or(u128::MAX);
                    Metrics::signer_eth_balance(&address.to_string(), wei as f64 / 1e18);
                    if wei < LOW_BALANCE_WEI {
                        warn!(signer = %address, balance_wei = wei, "Signer balance is low");
                    }
                }
                Err(e) => {
                    error!(signer = %address, error = %e, "Balance read failed");
                }
            }
        }
    }
}
