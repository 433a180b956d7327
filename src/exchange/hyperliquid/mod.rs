//! Hyperliquid venue integration.

mod client;
mod types;

pub use client::{HyperliquidClient, CANDLE_INTERVAL};
pub use types::*;
