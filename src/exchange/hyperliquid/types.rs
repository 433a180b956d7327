//! Type definitions for Hyperliquid API requests and responses.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Request type for the Hyperliquid info endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum InfoRequest {
    /// Get perpetuals universe metadata.
    #[serde(rename = "meta")]
    Meta,

    /// Get a snapshot of candles for one coin and time range.
    #[serde(rename = "candleSnapshot")]
    CandleSnapshot { req: CandleRequest },
}

/// Parameters for a candleSnapshot request.
#[derive(Debug, Clone, Serialize)]
pub struct CandleRequest {
    /// Coin in venue format (e.g. "BTC", "kPEPE")
    pub coin: String,
    /// Candle interval (e.g. "30m")
    pub interval: String,
    /// Window start, epoch milliseconds
    #[serde(rename = "startTime")]
    pub start_time: i64,
    /// Window end, epoch milliseconds
    #[serde(rename = "endTime")]
    pub end_time: i64,
}

/// Universe metadata for perpetuals.
#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub universe: Vec<AssetMeta>,
}

/// Metadata for a single asset in the universe.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMeta {
    /// Listing name (e.g., "BTC", "kPEPE")
    pub name: String,
    /// Size decimal precision
    pub sz_decimals: u8,
    /// Maximum allowed leverage
    pub max_leverage: u8,
    /// Whether only isolated margin is allowed
    #[serde(default)]
    pub only_isolated: bool,
}

/// A single OHLC candle as returned by candleSnapshot.
///
/// Prices and volume are string-encoded decimals on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct Candle {
    /// Candle open time, epoch milliseconds
    #[serde(rename = "t")]
    pub open_time: i64,
    /// Candle close time, epoch milliseconds
    #[serde(rename = "T")]
    pub close_time: i64,
    /// Coin in venue format
    #[serde(rename = "s")]
    pub symbol: String,
    /// Interval the candle covers (e.g. "30m")
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "o", deserialize_with = "deserialize_decimal_str")]
    pub open: Decimal,
    #[serde(rename = "c", deserialize_with = "deserialize_decimal_str")]
    pub close: Decimal,
    #[serde(rename = "h", deserialize_with = "deserialize_decimal_str")]
    pub high: Decimal,
    #[serde(rename = "l", deserialize_with = "deserialize_decimal_str")]
    pub low: Decimal,
    #[serde(rename = "v", deserialize_with = "deserialize_decimal_str")]
    pub volume: Decimal,
    /// Number of trades in the candle
    #[serde(rename = "n", default)]
    pub trades: u64,
}

// Custom deserializer for Hyperliquid's string-encoded decimals

fn deserialize_decimal_str<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    s.parse::<Decimal>().map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_candle() {
        let json = r#"{
            "t": 1718928000000,
            "T": 1718929800000,
            "s": "BTC",
            "i": "30m",
            "o": "64123.0",
            "c": "64250.5",
            "h": "64300.0",
            "l": "64050.25",
            "v": "123.456",
            "n": 4521
        }"#;

        let candle: Candle = serde_json::from_str(json).unwrap();
        assert_eq!(candle.symbol, "BTC");
        assert_eq!(candle.close_time, 1718929800000);
        assert_eq!(candle.close.to_string(), "64250.5");
        assert_eq!(candle.volume.to_string(), "123.456");
        assert_eq!(candle.trades, 4521);
    }

    #[test]
    fn test_deserialize_candle_without_trade_count() {
        let json = r#"{
            "t": 0, "T": 1800000, "s": "ETH", "i": "30m",
            "o": "3000", "c": "3010", "h": "3020", "l": "2990", "v": "0"
        }"#;

        let candle: Candle = serde_json::from_str(json).unwrap();
        assert_eq!(candle.trades, 0);
    }

    #[test]
    fn test_info_request_serialization() {
        let req = InfoRequest::Meta;
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"type":"meta"}"#);

        let req = InfoRequest::CandleSnapshot {
            req: CandleRequest {
                coin: "kPEPE".to_string(),
                interval: "30m".to_string(),
                start_time: 1718928000000,
                end_time: 1718929800000,
            },
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""type":"candleSnapshot""#));
        assert!(json.contains(r#""coin":"kPEPE""#));
        assert!(json.contains(r#""startTime":1718928000000"#));
    }
}
