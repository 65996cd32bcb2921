//! The event-driven indexing and action-dispatch engine.
//!
//! A [`Distributor`] drives per-market [`Keeper`] actors through a periodic
//! tick: scan a contiguous block range, update each keeper's in-memory
//! index, then let it select and submit actions through the signer pool.

pub mod delayed;
pub mod distributor;
pub mod error;
pub mod keeper;
pub mod liquidation;
pub mod notifier;

#[cfg(test)]
mod testutil;

pub use delayed::{DelayedKeeperConfig, DelayedOrdersKeeper, OffchainPricing, OrderFlavor};
pub use distributor::{Distributor, DistributorConfig};
pub use error::{EngineError, EngineResult};
pub use keeper::{ChainSnapshot, Keeper, KeeperDeps, SnapshotProvider};
pub use liquidation::LiquidationKeeper;
pub use notifier::{LogNotifier, Notifier};
