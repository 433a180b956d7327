//! Exchange integration for candle collection.
//!
//! ## Hyperliquid
//! Read-only access to perpetuals market data:
//! - Universe metadata (which symbols are listed)
//! - Historical 30-minute OHLC candle snapshots

pub mod hyperliquid;
pub mod symbols;

pub use hyperliquid::HyperliquidClient;
