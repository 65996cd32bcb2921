//! Pyth price-service client.
//!
//! Fetches signed VAAs over HTTP for submission alongside off-chain delayed
//! order execution.

pub mod client;
pub mod error;

pub use client::{PriceService, PythPriceClient};
pub use error::{PythError, PythResult};
