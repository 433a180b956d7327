//! Configuration management for the OHLC puller.
//!
//! Loads settings from environment variables and config files, with two
//! direct environment overrides matching the automation contract:
//! `DATA_FOLDER` (output directory) and `AUTOMATED` (single-run mode).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Hyperliquid API parameters
    #[serde(default)]
    pub api: ApiConfig,
    /// Candle storage parameters
    #[serde(default)]
    pub data: DataConfig,
    /// Scheduling parameters
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Commit/push automation parameters
    #[serde(default)]
    pub git: GitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the Hyperliquid API
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Maximum days covered by a single candleSnapshot request
    #[serde(default = "default_chunk_days")]
    pub chunk_days: i64,
    /// Delay between chunked requests in milliseconds
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
    /// Delay between assets within a cycle in milliseconds
    #[serde(default = "default_asset_delay_ms")]
    pub asset_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory holding the per-asset CSV files
    #[serde(default = "default_data_folder")]
    pub folder: String,
    /// Historical window fetched on a rebuild, in days
    #[serde(default = "default_historical_days")]
    pub historical_days: i64,
    /// Rebuild when the stored span is shorter than this many days
    /// (leaves headroom below the full window for market closures and gaps)
    #[serde(default = "default_rebuild_min_span_days")]
    pub rebuild_min_span_days: i64,
    /// Rebuild when the oldest stored row is newer than this many days
    #[serde(default = "default_rebuild_min_age_days")]
    pub rebuild_min_age_days: i64,
    /// SQLite run ledger path; lives outside the data folder so cycle
    /// bookkeeping never shows up as a data change
    #[serde(default = "default_ledger_path")]
    pub ledger_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Minutes between scheduled cycles
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    /// Run exactly one cycle and exit (automated-environment mode)
    #[serde(default)]
    pub single_run: bool,
    /// Run the integrity verification on cycles starting at hours
    /// divisible by this value
    #[serde(default = "default_verify_every_hours")]
    pub verify_every_hours: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Commit and push the data folder after each cycle
    #[serde(default)]
    pub enabled: bool,
    /// Repository the data folder lives in
    #[serde(default = "default_repo_path")]
    pub repo_path: String,
    /// Automation author identity for generated commits
    #[serde(default = "default_author_name")]
    pub author_name: String,
    #[serde(default = "default_author_email")]
    pub author_email: String,
}

// Default value functions

fn default_base_url() -> String {
    "https://api.hyperliquid.xyz".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_chunk_days() -> i64 {
    45 // stays safely under the API's per-request candle limit
}

fn default_chunk_delay_ms() -> u64 {
    500
}

fn default_asset_delay_ms() -> u64 {
    1000
}

fn default_data_folder() -> String {
    "data".to_string()
}

fn default_historical_days() -> i64 {
    365
}

fn default_rebuild_min_span_days() -> i64 {
    250
}

fn default_rebuild_min_age_days() -> i64 {
    300
}

fn default_ledger_path() -> String {
    "run_ledger.db".to_string()
}

fn default_interval_minutes() -> u64 {
    30
}

fn default_verify_every_hours() -> u32 {
    6
}

fn default_repo_path() -> String {
    ".".to_string()
}

fn default_author_name() -> String {
    "hl-ohlc-bot".to_string()
}

fn default_author_email() -> String {
    "hl-ohlc-bot@users.noreply.github.com".to_string()
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("HLP"))
            .build()
            .context("Failed to build configuration")?;

        let mut config: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.apply_env_overrides();
        Ok(config)
    }

    /// Direct overrides for the two variables the hosting automation sets.
    fn apply_env_overrides(&mut self) {
        if let Ok(folder) = std::env::var("DATA_FOLDER") {
            if !folder.trim().is_empty() {
                self.data.folder = folder;
            }
        }

        if let Ok(flag) = std::env::var("AUTOMATED") {
            if is_truthy(&flag) {
                self.schedule.single_run = true;
            }
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.schedule.interval_minutes >= 1,
            "interval_minutes must be at least 1"
        );

        anyhow::ensure!(
            self.data.historical_days >= 1,
            "historical_days must be at least 1"
        );

        anyhow::ensure!(
            self.api.chunk_days >= 1 && self.api.chunk_days <= self.data.historical_days,
            "chunk_days must be between 1 and historical_days"
        );

        anyhow::ensure!(
            self.data.rebuild_min_span_days <= self.data.historical_days,
            "rebuild_min_span_days cannot exceed historical_days"
        );

        if self.git.enabled {
            anyhow::ensure!(
                !self.git.repo_path.trim().is_empty()
                    && !self.git.author_name.trim().is_empty()
                    && !self.git.author_email.trim().is_empty(),
                "git.repo_path and the automation author identity must be set when git is enabled"
            );
        }

        Ok(())
    }

    /// The scheduled cycle interval.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.schedule.interval_minutes * 60)
    }
}

/// Boolean-like environment values: 1/true/yes/on, case-insensitive.
fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            data: DataConfig::default(),
            schedule: ScheduleConfig::default(),
            git: GitConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            chunk_days: default_chunk_days(),
            chunk_delay_ms: default_chunk_delay_ms(),
            asset_delay_ms: default_asset_delay_ms(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            folder: default_data_folder(),
            historical_days: default_historical_days(),
            rebuild_min_span_days: default_rebuild_min_span_days(),
            rebuild_min_age_days: default_rebuild_min_age_days(),
            ledger_path: default_ledger_path(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            single_run: false,
            verify_every_hours: default_verify_every_hours(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            repo_path: default_repo_path(),
            author_name: default_author_name(),
            author_email: default_author_email(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_match_collection_contract() {
        let config = Config::default();
        assert_eq!(config.schedule.interval_minutes, 30);
        assert_eq!(config.data.historical_days, 365);
        assert_eq!(config.api.chunk_days, 45);
        assert_eq!(config.data.folder, "data");
    }

    #[test]
    fn test_truthy_parsing() {
        assert!(is_truthy("1"));
        assert!(is_truthy("true"));
        assert!(is_truthy("TRUE"));
        assert!(is_truthy(" yes "));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("false"));
        assert!(!is_truthy(""));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.schedule.interval_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_chunk() {
        let mut config = Config::default();
        config.api.chunk_days = 400;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_git_identity() {
        let mut config = Config::default();
        config.git.enabled = true;
        config.git.author_name = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
