//! Data integrity verification for stored candle files.
//!
//! Pure inspection: reports row counts, spans and interval gaps without
//! ever mutating the store.

use chrono::{Duration, NaiveDateTime};
use tracing::{info, warn};

use crate::store::{CandleRow, CandleStore};

/// Expected spacing between consecutive candles.
pub const EXPECTED_INTERVAL: Duration = Duration::minutes(30);

/// Integrity status of one asset's candle file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityStatus {
    Ok {
        rows: usize,
        span_days: i64,
        gaps: usize,
        first: NaiveDateTime,
        last: NaiveDateTime,
    },
    /// No file on disk.
    Missing,
    /// File exists but holds no rows.
    Empty,
    /// File exists but could not be parsed.
    Malformed { error: String },
}

/// Verification result for one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetIntegrity {
    pub asset: String,
    pub status: IntegrityStatus,
}

impl AssetIntegrity {
    pub fn is_healthy(&self) -> bool {
        matches!(self.status, IntegrityStatus::Ok { gaps: 0, .. })
    }
}

/// Count spacing gaps: consecutive timestamps further apart than 1.5x the
/// expected interval. `rows` must be sorted ascending, which the store
/// guarantees for loaded files.
pub fn count_gaps(rows: &[CandleRow], expected: Duration) -> usize {
    let tolerance_secs = expected.num_seconds() * 3 / 2;

    rows.windows(2)
        .filter(|w| (w[1].timestamp - w[0].timestamp).num_seconds() > tolerance_secs)
        .count()
}

/// Verify one asset's file.
pub fn verify_asset(store: &CandleStore, asset: &str) -> AssetIntegrity {
    let status = match store.load(asset) {
        Ok(None) => {
            warn!("WARNING {}: Data file not found", asset);
            IntegrityStatus::Missing
        }
        Ok(Some(rows)) if rows.is_empty() => {
            warn!("WARNING {}: Empty data file", asset);
            IntegrityStatus::Empty
        }
        Ok(Some(rows)) => {
            let first = rows.first().map(|r| r.timestamp).unwrap_or_default();
            let last = rows.last().map(|r| r.timestamp).unwrap_or_default();
            let gaps = count_gaps(&rows, EXPECTED_INTERVAL);

            if gaps > 0 {
                warn!("WARNING {}: Found {} data gaps", asset, gaps);
            }
            info!(
                "VERIFIED {}: {} candles, {} days, {} to {}",
                asset,
                rows.len(),
                (last - first).num_days(),
                first,
                last
            );

            IntegrityStatus::Ok {
                rows: rows.len(),
                span_days: (last - first).num_days(),
                gaps,
                first,
                last,
            }
        }
        Err(e) => {
            warn!("ERROR verifying {}: {:#}", asset, e);
            IntegrityStatus::Malformed {
                error: format!("{:#}", e),
            }
        }
    };

    AssetIntegrity {
        asset: asset.to_string(),
        status,
    }
}

/// Verify every asset in `assets`.
pub fn verify_all(store: &CandleStore, assets: &[String]) -> Vec<AssetIntegrity> {
    info!("Verifying data integrity for {} assets...", assets.len());
    assets
        .iter()
        .map(|asset| verify_asset(store, asset))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::parse_timestamp;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn rows(timestamps: &[&str]) -> Vec<CandleRow> {
        timestamps
            .iter()
            .map(|ts| CandleRow {
                timestamp: parse_timestamp(ts).unwrap(),
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
    fn test_count_gaps_tolerates_exact_interval() {
        let rows = rows(&[
            "2024-01-01 00:00:00",
            "2024-01-01 00:30:00",
            "2024-01-01 01:00:00",
        ]);
        assert_eq!(count_gaps(&rows, EXPECTED_INTERVAL), 0);
    }

    #[test]
    fn test_count_gaps_flags_missing_candles() {
        // 00:30 -> 02:00 skips two candles; 45 minutes is within the
        // 1.5x tolerance and must not count
        let rows = rows(&[
            "2024-01-01 00:00:00",
            "2024-01-01 00:45:00",
            "2024-01-01 02:00:00",
        ]);
        assert_eq!(count_gaps(&rows, EXPECTED_INTERVAL), 1);
    }

    #[test]
    fn test_verify_missing_and_empty() {
        let dir = TempDir::new().unwrap();
        let store = CandleStore::new(dir.path()).unwrap();

        assert_eq!(verify_asset(&store, "BTC").status, IntegrityStatus::Missing);

        std::fs::write(store.file_path("BTC"), format!("{}\n", crate::store::CSV_HEADER)).unwrap();
        assert_eq!(verify_asset(&store, "BTC").status, IntegrityStatus::Empty);
    }

    #[test]
    fn test_verify_healthy_file() {
        let dir = TempDir::new().unwrap();
        let store = CandleStore::new(dir.path()).unwrap();
        store
            .merge_and_save(
                "BTC",
                rows(&["2024-01-01 00:00:00", "2024-01-01 00:30:00"]),
                true,
            )
            .unwrap();

        let integrity = verify_asset(&store, "BTC");
        assert!(integrity.is_healthy());
        assert_eq!(
            integrity.status,
            IntegrityStatus::Ok {
                rows: 2,
                span_days: 0,
                gaps: 0,
                first: parse_timestamp("2024-01-01 00:00:00").unwrap(),
                last: parse_timestamp("2024-01-01 00:30:00").unwrap(),
            }
        );
    }

    #[test]
    fn test_verify_malformed_file() {
        let dir = TempDir::new().unwrap();
        let store = CandleStore::new(dir.path()).unwrap();
        std::fs::write(store.file_path("BTC"), "garbage\n").unwrap();

        let integrity = verify_asset(&store, "BTC");
        assert!(matches!(integrity.status, IntegrityStatus::Malformed { .. }));
        assert!(!integrity.is_healthy());
    }
}
