//! Core domain types for the perps keeper.
//!
//! This crate provides the fundamental types shared across the keeper system:
//! - `ChainEvent`: a decoded contract event with its chain coordinates
//! - `DelayedOrder`, `Position`: the per-account index entries
//! - `Market`, `MarketKey`: market identity
//! - `wei`: conversions between 1e18 fixed-point chain units and `Decimal`

pub mod error;
pub mod events;
pub mod market;
pub mod order;
pub mod params;
pub mod position;
pub mod wei;

pub use error::{CoreError, Result};
pub use events::{ChainEvent, EventKind, EventPayload};
pub use market::{Market, MarketKey};
pub use order::DelayedOrder;
pub use position::Position;
