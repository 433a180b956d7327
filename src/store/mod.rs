//! Per-asset CSV candle storage.
//!
//! Each tracked asset owns one file, `{ASSET}_ohlc_30.csv`, in the data
//! directory. Rows are unique by timestamp and sorted ascending; merges
//! dedupe by timestamp keeping the newest occurrence, so re-saving the
//! same candles is a no-op at the file level.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::exchange::hyperliquid::Candle;
use crate::utils::time::{format_timestamp, parse_timestamp};

/// CSV header shared by all candle files.
pub const CSV_HEADER: &str = "timestamp,open,high,low,close,volume,asset,hl_symbol";

/// One stored candle row.
///
/// The timestamp is the candle's close time, naive in-file and always
/// interpreted as UTC.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleRow {
    pub timestamp: NaiveDateTime,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub asset: String,
    pub hl_symbol: String,
}

impl CandleRow {
    /// Build a row from an API candle, tagging it with the tracked asset name.
    pub fn from_candle(asset: &str, candle: &Candle) -> Option<Self> {
        let timestamp = DateTime::from_timestamp_millis(candle.close_time)?.naive_utc();

        Some(Self {
            timestamp,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
            asset: asset.to_string(),
            hl_symbol: candle.symbol.clone(),
        })
    }

    /// Parse a row from one CSV line.
    fn parse(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() < 8 {
            anyhow::bail!("Expected 8 columns ({}), got {}", CSV_HEADER, parts.len());
        }

        Ok(Self {
            timestamp: parse_timestamp(parts[0])
                .with_context(|| format!("Invalid timestamp: {}", parts[0]))?,
            open: parts[1]
                .trim()
                .parse()
                .with_context(|| format!("Invalid open: {}", parts[1]))?,
            high: parts[2]
                .trim()
                .parse()
                .with_context(|| format!("Invalid high: {}", parts[2]))?,
            low: parts[3]
                .trim()
                .parse()
                .with_context(|| format!("Invalid low: {}", parts[3]))?,
            close: parts[4]
                .trim()
                .parse()
                .with_context(|| format!("Invalid close: {}", parts[4]))?,
            volume: parts[5]
                .trim()
                .parse()
                .with_context(|| format!("Invalid volume: {}", parts[5]))?,
            asset: parts[6].trim().to_string(),
            hl_symbol: parts[7].trim().to_string(),
        })
    }

    fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{}",
            format_timestamp(self.timestamp),
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
            self.asset,
            self.hl_symbol
        )
    }
}

/// Row count and time range of one asset's file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSummary {
    pub rows: usize,
    pub first: NaiveDateTime,
    pub last: NaiveDateTime,
}

impl StoreSummary {
    /// Whole days covered by the file.
    pub fn span_days(&self) -> i64 {
        (self.last - self.first).num_days()
    }
}

/// Result of merging new candles into an asset's file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    pub existing: usize,
    pub incoming: usize,
    pub total: usize,
}

/// Filesystem-backed candle store over one data directory.
#[derive(Debug, Clone)]
pub struct CandleStore {
    data_dir: PathBuf,
}

impl CandleStore {
    /// Open a store, creating the data directory if needed.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        Ok(Self { data_dir })
    }

    /// The data directory this store writes into.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of an asset's candle file.
    pub fn file_path(&self, asset: &str) -> PathBuf {
        self.data_dir.join(format!("{}_ohlc_30.csv", asset))
    }

    /// Load an asset's rows. `None` when the file does not exist yet.
    pub fn load(&self, asset: &str) -> Result<Option<Vec<CandleRow>>> {
        let path = self.file_path(asset);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let mut rows = Vec::new();
        for (line_num, line) in content.lines().enumerate() {
            // Skip header
            if line_num == 0 && line.starts_with("timestamp") {
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }

            let row = CandleRow::parse(line).with_context(|| {
                format!("{}: failed to parse line {}", path.display(), line_num + 1)
            })?;
            rows.push(row);
        }

        Ok(Some(rows))
    }

    /// Row count and time range of an asset's file, without keeping the rows.
    pub fn summary(&self, asset: &str) -> Result<Option<StoreSummary>> {
        let Some(rows) = self.load(asset)? else {
            return Ok(None);
        };

        let (Some(first), Some(last)) = (
            rows.iter().map(|r| r.timestamp).min(),
            rows.iter().map(|r| r.timestamp).max(),
        ) else {
            return Ok(None); // file exists but holds no rows
        };

        Ok(Some(StoreSummary {
            rows: rows.len(),
            first,
            last,
        }))
    }

    /// Latest stored timestamp for an asset, if any rows exist.
    pub fn latest_timestamp(&self, asset: &str) -> Result<Option<NaiveDateTime>> {
        Ok(self.summary(asset)?.map(|s| s.last))
    }

    /// Merge new rows into an asset's file and save.
    ///
    /// With `replace` the existing file content is discarded; otherwise new
    /// rows are combined with the existing ones. Either way the result is
    /// deduped by timestamp (newest occurrence wins) and sorted ascending.
    pub fn merge_and_save(
        &self,
        asset: &str,
        new_rows: Vec<CandleRow>,
        replace: bool,
    ) -> Result<MergeStats> {
        let existing = if replace {
            Vec::new()
        } else {
            self.load(asset)?.unwrap_or_default()
        };

        let existing_count = existing.len();
        let incoming_count = new_rows.len();

        // BTreeMap dedupes by timestamp (later insert wins) and keeps
        // rows ordered ascending for the write below.
        let mut merged: BTreeMap<NaiveDateTime, CandleRow> = BTreeMap::new();
        for row in existing.into_iter().chain(new_rows) {
            merged.insert(row.timestamp, row);
        }

        let total = merged.len();
        self.write_rows(asset, merged.values())?;

        if replace {
            info!("Replaced data for {}: {} candles", asset, total);
        } else {
            info!(
                "Merged data for {}: {} existing + {} new = {} total",
                asset, existing_count, incoming_count, total
            );
        }

        Ok(MergeStats {
            existing: existing_count,
            incoming: incoming_count,
            total,
        })
    }

    /// Assets from `assets` that already have a candle file on disk.
    pub fn existing_assets<'a>(&self, assets: &[&'a str]) -> Vec<&'a str> {
        assets
            .iter()
            .copied()
            .filter(|asset| self.file_path(asset).exists())
            .collect()
    }

    fn write_rows<'a, I>(&self, asset: &str, rows: I) -> Result<()>
    where
        I: Iterator<Item = &'a CandleRow>,
    {
        let path = self.file_path(asset);
        let tmp_path = self.data_dir.join(format!(".{}_ohlc_30.csv.tmp", asset));

        let mut content = String::from(CSV_HEADER);
        content.push('\n');
        for row in rows {
            content.push_str(&row.to_csv_line());
            content.push('\n');
        }

        // Write-then-rename so a crash mid-write never truncates the live file
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &path)
            .with_context(|| format!("Failed to move {} into place", tmp_path.display()))?;

        debug!("Saved {} ({} bytes)", path.display(), content.len());
        Ok(())
    }
}
