//! Hyperliquid OHLC Puller - Main Entry Point
//!
//! Scheduled collection of 30-minute candles with git-backed CSV storage.

use anyhow::{Context, Result};
use chrono::{DateTime, Timelike, Utc};
use clap::{Parser, Subcommand};
use hl_ohlc_puller::config::Config;
use hl_ohlc_puller::exchange::symbols::TRACKED_ASSETS;
use hl_ohlc_puller::exchange::HyperliquidClient;
use hl_ohlc_puller::git::{CommitOutcome, DataCommitter};
use hl_ohlc_puller::persistence::RunLedger;
use hl_ohlc_puller::puller::{verify_all, CycleReport, IntegrityStatus, OhlcPuller};
use hl_ohlc_puller::store::CandleStore;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Hyperliquid OHLC Puller CLI
#[derive(Parser)]
#[command(name = "hl-ohlc-puller")]
#[command(version, about = "30-minute OHLC candle collector for Hyperliquid perpetuals")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single update cycle and exit
    Pull,

    /// Run a single cycle with a full historical rebuild for every asset
    Rebuild,

    /// Check integrity of stored candle files without modifying anything
    Verify,

    /// Show recent cycle history from the run ledger
    Status {
        /// Number of cycles to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load()?;
    config.validate()?;

    match cli.command {
        Some(Commands::Pull) => return run_single_cycle(&config, false).await,
        Some(Commands::Rebuild) => return run_single_cycle(&config, true).await,
        Some(Commands::Verify) => return run_verify(&config),
        Some(Commands::Status { limit }) => return show_status(&config, limit),
        None => {}
    }

    info!("╔════════════════════════════════════════════════════════════╗");
    info!(
        "║        Hyperliquid OHLC Puller v{}                       ║",
        env!("CARGO_PKG_VERSION")
    );
    info!("╚════════════════════════════════════════════════════════════╝");
    log_config(&config);

    if config.schedule.single_run {
        info!("🤖 Automated environment - single run mode");
        return run_single_cycle(&config, false).await;
    }

    run_scheduled(&config).await
}

/// Continuous scheduled mode: one cycle every interval until shutdown.
///
/// Cycles run sequentially on this task, so a slow cycle delays the next
/// tick instead of overlapping with it.
async fn run_scheduled(config: &Config) -> Result<()> {
    let puller = build_puller(config)?;
    let ledger = RunLedger::new(&config.data.ledger_path)?;

    // Shutdown signal
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Shutdown signal received");
        shutdown_clone.store(true, Ordering::SeqCst);
    });

    info!(
        "🚀 Starting scheduler - update every {} minutes",
        config.schedule.interval_minutes
    );

    let mut cycles_run: u64 = 0;
    let mut commits_created: u64 = 0;

    while !shutdown.load(Ordering::SeqCst) {
        let cycle_start = Utc::now();
        let report = puller.run_cycle(false, &shutdown).await;
        cycles_run += 1;

        if let Err(e) = ledger.record_cycle(&report) {
            warn!("⚠️  [LEDGER] Failed to record cycle: {:#}", e);
        }

        if should_verify(
            cycle_start,
            config.schedule.verify_every_hours,
            config.schedule.interval_minutes,
        ) {
            log_verify_summary(&puller);
        }

        match finalize_cycle(config, &report) {
            Ok(true) => commits_created += 1,
            Ok(false) => {}
            Err(e) => {
                // A later cycle's push carries any commits stranded here
                error!("❌ [GIT] Commit step failed: {:#}", e);
            }
        }

        info!(
            "💤 [SCHED] Cycle {} done ({} commits so far), next run in {} minutes",
            cycles_run, commits_created, config.schedule.interval_minutes
        );

        // Sleep in short steps so Ctrl-C is honored promptly
        let mut remaining = config.interval();
        while !shutdown.load(Ordering::SeqCst) && !remaining.is_zero() {
            let step = std::cmp::min(remaining, Duration::from_secs(1));
            tokio::time::sleep(step).await;
            remaining -= step;
        }
    }

    info!("👋 Scheduler stopped after {} cycles", cycles_run);
    Ok(())
}

/// One cycle (manual dispatch or automated single-run), then exit.
///
/// Unlike scheduled mode, a failing commit step fails the whole run so
/// the hosting automation surfaces it.
async fn run_single_cycle(config: &Config, force_rebuild: bool) -> Result<()> {
    let puller = build_puller(config)?;
    let shutdown = AtomicBool::new(false);

    let report = puller.run_cycle(force_rebuild, &shutdown).await;

    match RunLedger::new(&config.data.ledger_path) {
        Ok(ledger) => {
            if let Err(e) = ledger.record_cycle(&report) {
                warn!("⚠️  [LEDGER] Failed to record cycle: {:#}", e);
            }
        }
        Err(e) => warn!("⚠️  [LEDGER] Unavailable: {:#}", e),
    }

    finalize_cycle(config, &report)?;
    info!("✅ Run completed successfully");
    Ok(())
}

/// Commit and push the data folder when enabled. Returns whether a
/// commit was created.
fn finalize_cycle(config: &Config, report: &CycleReport) -> Result<bool> {
    if !config.git.enabled {
        return Ok(false);
    }

    if report.succeeded == 0 && report.failed == 0 {
        // Nothing was attempted (e.g. shutdown before the first asset)
        return Ok(false);
    }

    let committer = DataCommitter::new(
        config.git.repo_path.as_str(),
        config.git.author_name.as_str(),
        config.git.author_email.as_str(),
    );

    let outcome = committer
        .commit_if_changed(Path::new(&config.data.folder), Utc::now())
        .context("Failed to commit data directory")?;

    Ok(matches!(outcome, CommitOutcome::Committed { .. }))
}

/// Integrity check over every tracked asset, read-only.
fn run_verify(config: &Config) -> Result<()> {
    let store = CandleStore::new(&config.data.folder)?;
    let assets: Vec<String> = TRACKED_ASSETS.iter().map(|s| s.to_string()).collect();

    let results = verify_all(&store, &assets);

    let mut healthy = 0usize;
    let mut gappy = 0usize;
    let mut missing = 0usize;
    let mut broken = 0usize;
    for result in &results {
        match &result.status {
            IntegrityStatus::Ok { gaps: 0, .. } => healthy += 1,
            IntegrityStatus::Ok { .. } => gappy += 1,
            IntegrityStatus::Missing => missing += 1,
            IntegrityStatus::Empty | IntegrityStatus::Malformed { .. } => broken += 1,
        }
    }

    info!(
        "📋 [VERIFY] {} assets: {} healthy, {} with gaps, {} missing, {} broken",
        results.len(),
        healthy,
        gappy,
        missing,
        broken
    );

    anyhow::ensure!(broken == 0, "{} candle files are empty or malformed", broken);
    Ok(())
}

/// Print recent cycle history from the run ledger.
fn show_status(config: &Config, limit: usize) -> Result<()> {
    let ledger = RunLedger::new(&config.data.ledger_path)?;

    let cycles = ledger.recent_cycles(limit)?;
    if cycles.is_empty() {
        println!("No recorded cycles yet.");
        return Ok(());
    }

    println!("Recent cycles (newest first):");
    for cycle in &cycles {
        println!(
            "  {}  {:>3} ok  {:>3} failed  {:>3} rebuilt  {:>3} skipped  ({}s)",
            cycle.started.format("%Y-%m-%d %H:%M:%S"),
            cycle.succeeded,
            cycle.failed,
            cycle.rebuilt,
            cycle.skipped,
            cycle.duration_secs()
        );
    }

    let offenders = ledger.failure_counts(5)?;
    if !offenders.is_empty() {
        println!("Most-failing assets:");
        for (asset, count) in offenders {
            println!("  {:<8} {} failures", asset, count);
        }
    }

    Ok(())
}

fn build_puller(config: &Config) -> Result<OhlcPuller> {
    let client = HyperliquidClient::new(&config.api)?;
    let store = CandleStore::new(&config.data.folder)?;

    let existing = store.existing_assets(&TRACKED_ASSETS);
    if existing.is_empty() {
        info!("📂 No existing data files - first cycle will fetch full history");
    } else {
        info!("📂 Found {} existing data files", existing.len());
    }

    Ok(OhlcPuller::new(client, store, config))
}

/// Whether a cycle starting at `start` should also run verification.
///
/// Fires on cycles beginning in the first interval of every Nth hour,
/// so one verification pass happens per cadence window.
fn should_verify(start: DateTime<Utc>, every_hours: u32, interval_minutes: u64) -> bool {
    if every_hours == 0 {
        return false;
    }
    start.hour() % every_hours == 0 && u64::from(start.minute()) < interval_minutes
}

fn log_verify_summary(puller: &OhlcPuller) {
    let results = verify_all(puller.store(), puller.assets());
    let unhealthy = results.iter().filter(|r| !r.is_healthy()).count();
    if unhealthy > 0 {
        warn!(
            "📋 [VERIFY] {} of {} assets need attention",
            unhealthy,
            results.len()
        );
    } else {
        info!("📋 [VERIFY] All {} assets healthy", results.len());
    }
}

fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // File appender for detailed logs
    let file_appender = tracing_appender::rolling::hourly("logs", "hl-ohlc-puller.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(_guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("hl_ohlc_puller=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    info!("📋 Configuration:");
    info!("   Data folder: {}", config.data.folder);
    info!("   Interval: {} minutes", config.schedule.interval_minutes);
    info!("   Historical window: {} days", config.data.historical_days);
    info!(
        "   Chunking: {} days per request, {} ms between chunks",
        config.api.chunk_days, config.api.chunk_delay_ms
    );
    info!(
        "   Git automation: {}",
        if config.git.enabled {
            format!("enabled ({} <{}>)", config.git.author_name, config.git.author_email)
        } else {
            "disabled".to_string()
        }
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_should_verify_cadence() {
        let at = |h, m| Utc.with_ymd_and_hms(2024, 6, 21, h, m, 0).unwrap();

        // First interval of an aligned hour
        assert!(should_verify(at(6, 0), 6, 30));
        assert!(should_verify(at(6, 29), 6, 30));
        // Second interval of an aligned hour
        assert!(!should_verify(at(6, 30), 6, 30));
        // Unaligned hour
        assert!(!should_verify(at(7, 0), 6, 30));
        // Disabled cadence
        assert!(!should_verify(at(6, 0), 0, 30));
    }
}
