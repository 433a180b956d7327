//! Update-cycle orchestration.
//!
//! One cycle walks the tracked universe, decides per asset between an
//! incremental update and a full historical rebuild, fetches candles and
//! merges them into the store. Per-asset failures are isolated: they are
//! logged and counted, and the cycle keeps going.

mod verify;

pub use verify::{verify_all, verify_asset, AssetIntegrity, IntegrityStatus, EXPECTED_INTERVAL};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::exchange::symbols::{hyperliquid_symbol, TRACKED_ASSETS};
use crate::exchange::HyperliquidClient;
use crate::store::{CandleRow, CandleStore};

/// Outcome of updating one asset within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Incremental update merged into the existing file.
    Updated { rows: usize },
    /// File was rebuilt from the full historical window.
    Rebuilt { rows: usize },
    /// Asset is not listed on the venue; nothing fetched.
    Skipped,
}

/// One failed asset within a cycle.
#[derive(Debug, Clone)]
pub struct AssetFailure {
    pub asset: String,
    pub error: String,
}

/// Summary of one completed update cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub succeeded: u32,
    pub failed: u32,
    pub rebuilt: u32,
    pub skipped: u32,
    pub failures: Vec<AssetFailure>,
}

impl CycleReport {
    pub fn duration(&self) -> ChronoDuration {
        self.finished - self.started
    }

    /// Fraction of attempted assets that succeeded, in percent.
    pub fn success_rate(&self) -> f64 {
        let attempted = self.succeeded + self.failed;
        if attempted == 0 {
            return 100.0;
        }
        f64::from(self.succeeded) / f64::from(attempted) * 100.0
    }
}

/// Walks the tracked universe and keeps the candle store current.
pub struct OhlcPuller {
    client: HyperliquidClient,
    store: CandleStore,
    assets: Vec<String>,
    historical_days: i64,
    rebuild_min_span_days: i64,
    rebuild_min_age_days: i64,
    asset_delay: Duration,
}

impl OhlcPuller {
    /// Create a puller over the default tracked universe.
    pub fn new(client: HyperliquidClient, store: CandleStore, config: &Config) -> Self {
        Self {
            client,
            store,
            assets: TRACKED_ASSETS.iter().map(|s| s.to_string()).collect(),
            historical_days: config.data.historical_days,
            rebuild_min_span_days: config.data.rebuild_min_span_days,
            rebuild_min_age_days: config.data.rebuild_min_age_days,
            asset_delay: Duration::from_millis(config.api.asset_delay_ms),
        }
    }

    /// Restrict the puller to a specific asset list.
    pub fn with_assets(mut self, assets: Vec<String>) -> Self {
        self.assets = assets;
        self
    }

    pub fn store(&self) -> &CandleStore {
        &self.store
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    /// Run one update cycle over the whole universe.
    ///
    /// The shutdown flag is checked between assets so Ctrl-C lands within
    /// one asset's worth of work.
    pub async fn run_cycle(&self, force_rebuild: bool, shutdown: &AtomicBool) -> CycleReport {
        let started = Utc::now();
        info!(
            "📡 [CYCLE] Starting update cycle for {} assets",
            self.assets.len()
        );

        // Listing failures degrade to an optimistic fetch: an unlisted
        // asset then fails its own snapshot request instead of silently
        // skipping the entire universe.
        let listed = match self.client.listed_symbols().await {
            Ok(symbols) => Some(symbols),
            Err(e) => {
                warn!("⚠️  [CYCLE] Could not fetch listed symbols: {:#}", e);
                None
            }
        };

        let mut report = CycleReport {
            started,
            finished: started,
            succeeded: 0,
            failed: 0,
            rebuilt: 0,
            skipped: 0,
            failures: Vec::new(),
        };

        let total = self.assets.len();
        for (i, asset) in self.assets.iter().enumerate() {
            if shutdown.load(Ordering::SeqCst) {
                warn!("🛑 [CYCLE] Shutdown requested, stopping after {} assets", i);
                break;
            }

            info!("Processing {} ({}/{})", asset, i + 1, total);

            match self
                .update_asset(asset, listed.as_ref(), force_rebuild, Utc::now())
                .await
            {
                Ok(UpdateOutcome::Updated { rows }) => {
                    report.succeeded += 1;
                    info!("✅ [CYCLE] Updated {} ({} rows on disk)", asset, rows);
                }
                Ok(UpdateOutcome::Rebuilt { rows }) => {
                    report.succeeded += 1;
                    report.rebuilt += 1;
                    info!("✅ [CYCLE] Rebuilt {} ({} rows on disk)", asset, rows);
                }
                Ok(UpdateOutcome::Skipped) => {
                    report.skipped += 1;
                }
                Err(e) => {
                    report.failed += 1;
                    error!("❌ [CYCLE] {} failed: {:#}", asset, e);
                    report.failures.push(AssetFailure {
                        asset: asset.clone(),
                        error: format!("{:#}", e),
                    });
                }
            }

            // Delay between assets to avoid rate limiting
            if i + 1 < total && !self.asset_delay.is_zero() {
                tokio::time::sleep(self.asset_delay).await;
            }
        }

        report.finished = Utc::now();
        info!(
            "📊 [CYCLE] Completed in {}s: {} ok, {} failed, {} rebuilt, {} skipped ({:.1}% success)",
            report.duration().num_seconds(),
            report.succeeded,
            report.failed,
            report.rebuilt,
            report.skipped,
            report.success_rate()
        );

        report
    }

    /// Update a single asset, deciding between incremental and rebuild.
    #[instrument(skip(self, listed, now))]
    async fn update_asset(
        &self,
        asset: &str,
        listed: Option<&HashSet<String>>,
        force_rebuild: bool,
        now: DateTime<Utc>,
    ) -> Result<UpdateOutcome> {
        let hl_symbol = hyperliquid_symbol(asset);

        if let Some(listed) = listed {
            if !listed.contains(hl_symbol) {
                warn!("Skipping {} ({}) - not listed on Hyperliquid", asset, hl_symbol);
                return Ok(UpdateOutcome::Skipped);
            }
        }

        let rebuild = force_rebuild || self.should_rebuild(asset, now)?;

        let start = if rebuild {
            now - ChronoDuration::days(self.historical_days)
        } else {
            // should_rebuild returned false, so a summary exists; refetching
            // from the last stored candle lets the merge revise it in place.
            let latest = self
                .store
                .latest_timestamp(asset)?
                .context("missing data despite negative rebuild check")?;
            DateTime::from_naive_utc_and_offset(latest, Utc)
        };

        if rebuild {
            info!(
                "Fetching {} ({}) - FULL {} days from {}",
                asset,
                hl_symbol,
                self.historical_days,
                start.format("%Y-%m-%d")
            );
        } else {
            info!("Fetching {} ({}) - UPDATE from {}", asset, hl_symbol, start);
        }

        let candles = self.client.fetch_window(hl_symbol, start, now).await?;
        if candles.is_empty() {
            anyhow::bail!("no candle data returned for window starting {}", start);
        }

        let rows: Vec<CandleRow> = candles
            .iter()
            .filter_map(|c| CandleRow::from_candle(asset, c))
            .collect();
        if rows.is_empty() {
            anyhow::bail!("no valid candles after conversion");
        }

        let stats = self.store.merge_and_save(asset, rows, rebuild)?;

        Ok(if rebuild {
            UpdateOutcome::Rebuilt { rows: stats.total }
        } else {
            UpdateOutcome::Updated { rows: stats.total }
        })
    }

    /// Whether an asset's file should be rebuilt from the full window.
    ///
    /// Rebuild when there is no usable file, when the stored span is too
    /// short, or when the oldest row is too recent to cover the expected
    /// historical depth.
    fn should_rebuild(&self, asset: &str, now: DateTime<Utc>) -> Result<bool> {
        let Some(summary) = self.store.summary(asset)? else {
            info!(
                "{}: No existing data, will fetch {} days",
                asset, self.historical_days
            );
            return Ok(true);
        };

        let span = summary.span_days();
        if span < self.rebuild_min_span_days {
            info!(
                "{}: Existing data spans only {} days, rebuilding for {} days",
                asset, span, self.historical_days
            );
            return Ok(true);
        }

        let age = (now.naive_utc() - summary.first).num_days();
        if age < self.rebuild_min_age_days {
            info!(
                "{}: Data only goes back {} days, rebuilding for {} days",
                asset, age, self.historical_days
            );
            return Ok(true);
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiConfig, Config};
    use crate::utils::time::parse_timestamp;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> Config {
        let mut config = Config::default();
        config.api = ApiConfig {
            base_url: base_url.to_string(),
            request_timeout_secs: 5,
            chunk_days: 45,
            chunk_delay_ms: 0,
            asset_delay_ms: 0,
        };
        config.data.historical_days = 2;
        config.data.rebuild_min_span_days = 1;
        config.data.rebuild_min_age_days = 1;
        config
    }

    fn puller_at(dir: &TempDir, config: &Config) -> OhlcPuller {
        let client = HyperliquidClient::new(&config.api).unwrap();
        let store = CandleStore::new(dir.path()).unwrap();
        OhlcPuller::new(client, store, config)
    }

    fn seed_rows(ts: &[&str]) -> Vec<CandleRow> {
        ts.iter()
            .map(|t| CandleRow {
                timestamp: parse_timestamp(t).unwrap(),
                open: dec!(1),
                high: dec!(1),
                low: dec!(1),
                close: dec!(1),
                volume: dec!(1),
                asset: "BTC".to_string(),
                hl_symbol: "BTC".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_should_rebuild_policies() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config("http://unused");
        config.data.rebuild_min_span_days = 250;
        config.data.rebuild_min_age_days = 300;
        let puller = puller_at(&dir, &config);

        let now = Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap();

        // No file yet
        assert!(puller.should_rebuild("BTC", now).unwrap());

        // Short span (two rows a day apart)
        puller
            .store
            .merge_and_save(
                "BTC",
                seed_rows(&["2024-12-01 00:00:00", "2024-12-02 00:00:00"]),
                true,
            )
            .unwrap();
        assert!(puller.should_rebuild("BTC", now).unwrap());

        // Long span but oldest row too recent: 260-day span starting
        // ~270 days before `now` fails the 300-day age requirement
        puller
            .store
            .merge_and_save(
                "BTC",
                seed_rows(&["2024-04-05 00:00:00", "2024-12-21 00:00:00"]),
                true,
            )
            .unwrap();
        assert!(puller.should_rebuild("BTC", now).unwrap());

        // Deep enough history: spans 310 days, oldest row 320 days old
        puller
            .store
            .merge_and_save(
                "BTC",
                seed_rows(&["2024-02-15 00:00:00", "2024-12-21 00:00:00"]),
                true,
            )
            .unwrap();
        assert!(!puller.should_rebuild("BTC", now).unwrap());
    }

    #[tokio::test]
    async fn test_cycle_rebuilds_and_skips() {
        let server = MockServer::start().await;

        // Only BTC is listed; ETH must be skipped without a snapshot request
        Mock::given(method("POST"))
            .and(path("/info"))
            .and(body_partial_json(serde_json::json!({"type": "meta"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "universe": [{"name": "BTC", "szDecimals": 5, "maxLeverage": 50}]
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/info"))
            .and(body_partial_json(serde_json::json!({
                "type": "candleSnapshot",
                "req": {"coin": "BTC"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"t": 1718928000000i64, "T": 1718929800000i64, "s": "BTC", "i": "30m",
                 "o": "64000", "c": "64100", "h": "64200", "l": "63900", "v": "12.5", "n": 100}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let config = test_config(&server.uri());
        let puller =
            puller_at(&dir, &config).with_assets(vec!["BTC".to_string(), "ETH".to_string()]);

        let shutdown = AtomicBool::new(false);
        let report = puller.run_cycle(false, &shutdown).await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.rebuilt, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
        assert!(puller.store().file_path("BTC").exists());
        assert!(!puller.store().file_path("ETH").exists());
    }

    #[tokio::test]
    async fn test_cycle_isolates_asset_failures() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/info"))
            .and(body_partial_json(serde_json::json!({"type": "meta"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "universe": [
                    {"name": "BTC", "szDecimals": 5, "maxLeverage": 50},
                    {"name": "ETH", "szDecimals": 4, "maxLeverage": 50}
                ]
            })))
            .mount(&server)
            .await;

        // BTC returns an empty snapshot (counts as failure), ETH succeeds
        Mock::given(method("POST"))
            .and(path("/info"))
            .and(body_partial_json(serde_json::json!({
                "type": "candleSnapshot",
                "req": {"coin": "BTC"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/info"))
            .and(body_partial_json(serde_json::json!({
                "type": "candleSnapshot",
                "req": {"coin": "ETH"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"t": 0i64, "T": 1800000i64, "s": "ETH", "i": "30m",
                 "o": "3000", "c": "3010", "h": "3020", "l": "2990", "v": "1", "n": 1}
            ])))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let config = test_config(&server.uri());
        let puller =
            puller_at(&dir, &config).with_assets(vec!["BTC".to_string(), "ETH".to_string()]);

        let shutdown = AtomicBool::new(false);
        let report = puller.run_cycle(false, &shutdown).await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].asset, "BTC");
        // The failed asset's (absent) file is untouched
        assert!(!puller.store().file_path("BTC").exists());
        assert!(puller.store().file_path("ETH").exists());
    }

    #[tokio::test]
    async fn test_shutdown_stops_cycle_between_assets() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let config = test_config(&server.uri());
        let puller =
            puller_at(&dir, &config).with_assets(vec!["BTC".to_string(), "ETH".to_string()]);

        let shutdown = AtomicBool::new(true);
        let report = puller.run_cycle(false, &shutdown).await;

        assert_eq!(report.succeeded + report.failed + report.skipped, 0);
    }

    #[test]
    fn test_success_rate_ignores_skipped() {
        let report = CycleReport {
            started: Utc::now(),
            finished: Utc::now(),
            succeeded: 3,
            failed: 1,
            rebuilt: 0,
            skipped: 90,
            failures: Vec::new(),
        };
        assert!((report.success_rate() - 75.0).abs() < f64::EPSILON);
    }
}
