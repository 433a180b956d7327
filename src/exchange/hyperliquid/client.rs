//! Hyperliquid REST API client.
//!
//! Provides read-only access to Hyperliquid perpetuals market data:
//! - Universe metadata (listed symbols)
//! - Historical OHLC candle snapshots, with chunked fetches for
//!   windows longer than the API is willing to serve in one response

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::types::*;
use crate::config::ApiConfig;
use crate::utils::time::chunk_ranges;

/// Base URL for Hyperliquid mainnet API.
const MAINNET_API_URL: &str = "https://api.hyperliquid.xyz";

/// Candle interval requested from the venue.
pub const CANDLE_INTERVAL: &str = "30m";

/// Hyperliquid API client for fetching market data.
#[derive(Debug, Clone)]
pub struct HyperliquidClient {
    client: Client,
    base_url: String,
    chunk_days: i64,
    chunk_delay: Duration,
}

impl HyperliquidClient {
    /// Create a client from API configuration.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            chunk_days: config.chunk_days,
            chunk_delay: Duration::from_millis(config.chunk_delay_ms),
        })
    }

    /// Create a client for mainnet with default fetch parameters.
    pub fn mainnet() -> Result<Self> {
        Self::new(&ApiConfig {
            base_url: MAINNET_API_URL.to_string(),
            ..ApiConfig::default()
        })
    }

    /// Get the perpetuals universe metadata.
    #[instrument(skip(self), name = "hl_meta")]
    pub async fn meta(&self) -> Result<Meta> {
        let url = format!("{}/info", self.base_url);
        let request = InfoRequest::Meta;

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send meta request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Hyperliquid API error {}: {}", status, body);
        }

        let meta: Meta = response
            .json()
            .await
            .context("Failed to parse meta response")?;

        debug!("Fetched {} listed assets from Hyperliquid", meta.universe.len());
        Ok(meta)
    }

    /// Get the set of symbols currently listed on the venue.
    ///
    /// Assets whose venue symbol is absent from this set are skipped by
    /// the puller instead of producing request errors every cycle.
    #[instrument(skip(self), name = "hl_listed_symbols")]
    pub async fn listed_symbols(&self) -> Result<HashSet<String>> {
        let meta = self.meta().await?;

        let symbols: HashSet<String> = meta.universe.into_iter().map(|a| a.name).collect();

        info!("Hyperliquid lists {} perpetual symbols", symbols.len());
        Ok(symbols)
    }

    /// Fetch one candle snapshot for a coin and time range.
    #[instrument(skip(self), name = "hl_candle_snapshot")]
    pub async fn candle_snapshot(
        &self,
        coin: &str,
        start_time_ms: i64,
        end_time_ms: i64,
    ) -> Result<Vec<Candle>> {
        let url = format!("{}/info", self.base_url);
        let request = InfoRequest::CandleSnapshot {
            req: CandleRequest {
                coin: coin.to_string(),
                interval: CANDLE_INTERVAL.to_string(),
                start_time: start_time_ms,
                end_time: end_time_ms,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send candleSnapshot request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Hyperliquid API error {}: {}", status, body);
        }

        let candles: Vec<Candle> = response
            .json()
            .await
            .context("Failed to parse candleSnapshot response")?;

        debug!("Fetched {} candles for {}", candles.len(), coin);
        Ok(candles)
    }

    /// Fetch all candles for a coin over `[start, end)`.
    ///
    /// Windows longer than the configured chunk size are split into
    /// consecutive chunks with a delay between requests. A chunk failure
    /// aborts the remainder of the window; candles already fetched are
    /// discarded so the caller never merges a window with a silent hole
    /// in the middle.
    #[instrument(skip(self, start, end), name = "hl_fetch_window")]
    pub async fn fetch_window(
        &self,
        coin: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let chunks = chunk_ranges(start, end, chrono::Duration::days(self.chunk_days));
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let chunk_count = chunks.len();
        if chunk_count > 1 {
            info!(
                "Fetching {} in {} chunks of up to {} days",
                coin, chunk_count, self.chunk_days
            );
        }

        let mut all_candles = Vec::new();
        for (i, (chunk_start, chunk_end)) in chunks.into_iter().enumerate() {
            let candles = self
                .candle_snapshot(
                    coin,
                    chunk_start.timestamp_millis(),
                    chunk_end.timestamp_millis(),
                )
                .await
                .with_context(|| {
                    format!(
                        "Chunk {}/{} ({} to {}) failed for {}",
                        i + 1,
                        chunk_count,
                        chunk_start.format("%Y-%m-%d"),
                        chunk_end.format("%Y-%m-%d"),
                        coin
                    )
                })?;

            if candles.is_empty() {
                warn!("No data in chunk {}/{} for {}", i + 1, chunk_count, coin);
            } else {
                debug!(
                    "Chunk {}/{}: {} candles for {}",
                    i + 1,
                    chunk_count,
                    candles.len(),
                    coin
                );
                all_candles.extend(candles);
            }

            // Stay under the venue's rate limits between chunks
            if i + 1 < chunk_count && !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
        }

        debug!("Fetched {} total candles for {}", all_candles.len(), coin);
        Ok(all_candles)
    }
}
