//! SQLite run ledger for cycle history.
//!
//! Records the outcome of every update cycle so `status` can show what
//! the collector has been doing, and which assets keep failing.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::{debug, info};

use crate::puller::CycleReport;

/// One recorded cycle, as read back from the ledger.
#[derive(Debug, Clone)]
pub struct CycleSummary {
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub succeeded: u32,
    pub failed: u32,
    pub rebuilt: u32,
    pub skipped: u32,
}

impl CycleSummary {
    pub fn duration_secs(&self) -> i64 {
        (self.finished - self.started).num_seconds()
    }
}

/// SQLite-based ledger of completed cycles.
pub struct RunLedger {
    conn: Connection,
}

impl RunLedger {
    /// Open the ledger, initializing the database if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open ledger at {:?}", db_path.as_ref()))?;

        let ledger = Self { conn };
        ledger.init_schema()?;

        info!("Run ledger initialized at {:?}", db_path.as_ref());
        Ok(ledger)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            -- Completed update cycles
            CREATE TABLE IF NOT EXISTS cycles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                started TEXT NOT NULL,
                finished TEXT NOT NULL,
                succeeded INTEGER NOT NULL,
                failed INTEGER NOT NULL,
                rebuilt INTEGER NOT NULL,
                skipped INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_cycles_started ON cycles(started);

            -- Per-asset failures within a cycle
            CREATE TABLE IF NOT EXISTS asset_failures (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cycle_id INTEGER NOT NULL REFERENCES cycles(id),
                asset TEXT NOT NULL,
                error TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_failures_asset ON asset_failures(asset);
            "#,
        )?;

        debug!("Ledger schema initialized");
        Ok(())
    }

    /// Record a completed cycle and its per-asset failures.
    pub fn record_cycle(&self, report: &CycleReport) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            r#"
            INSERT INTO cycles (started, finished, succeeded, failed, rebuilt, skipped)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                report.started.to_rfc3339(),
                report.finished.to_rfc3339(),
                report.succeeded,
                report.failed,
                report.rebuilt,
                report.skipped,
            ],
        )?;
        let cycle_id = tx.last_insert_rowid();

        for failure in &report.failures {
            tx.execute(
                r#"
                INSERT INTO asset_failures (cycle_id, asset, error)
                VALUES (?1, ?2, ?3)
                "#,
                params![cycle_id, failure.asset, failure.error],
            )?;
        }

        tx.commit()?;

        debug!(
            cycle_id,
            succeeded = report.succeeded,
            failed = report.failed,
            "Cycle recorded in ledger"
        );
        Ok(cycle_id)
    }

    /// Most recent cycles, newest first.
    pub fn recent_cycles(&self, limit: usize) -> Result<Vec<CycleSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT started, finished, succeeded, failed, rebuilt, skipped
            FROM cycles
            ORDER BY started DESC
            LIMIT ?1
            "#,
        )?;

        let cycles: Vec<CycleSummary> = stmt
            .query_map([limit], |row| {
                let started: String = row.get(0)?;
                let finished: String = row.get(1)?;
                Ok(CycleSummary {
                    started: DateTime::parse_from_rfc3339(&started)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                    finished: DateTime::parse_from_rfc3339(&finished)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                    succeeded: row.get(2)?,
                    failed: row.get(3)?,
                    rebuilt: row.get(4)?,
                    skipped: row.get(5)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(cycles)
    }

    /// Assets with the most recorded failures, descending.
    pub fn failure_counts(&self, limit: usize) -> Result<Vec<(String, u32)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT asset, COUNT(*) as failures
            FROM asset_failures
            GROUP BY asset
            ORDER BY failures DESC
            LIMIT ?1
            "#,
        )?;

        let counts: Vec<(String, u32)> = stmt
            .query_map([limit], |row| Ok((row.get(0)?, row.get(1)?)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::puller::AssetFailure;

    fn report(succeeded: u32, failed_assets: &[&str]) -> CycleReport {
        CycleReport {
            started: Utc::now(),
            finished: Utc::now() + chrono::Duration::seconds(42),
            succeeded,
            failed: failed_assets.len() as u32,
            rebuilt: 1,
            skipped: 2,
            failures: failed_assets
                .iter()
                .map(|a| AssetFailure {
                    asset: a.to_string(),
                    error: "no candle data returned".to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_record_and_read_back() {
        let ledger = RunLedger::new(":memory:").unwrap();

        ledger.record_cycle(&report(90, &["XVG"])).unwrap();
        ledger.record_cycle(&report(91, &[])).unwrap();

        let cycles = ledger.recent_cycles(10).unwrap();
        assert_eq!(cycles.len(), 2);
        assert_eq!(cycles[0].succeeded, 91); // newest first
        assert_eq!(cycles[1].succeeded, 90);
        assert_eq!(cycles[1].failed, 1);
        assert_eq!(cycles[1].duration_secs(), 42);
    }

    #[test]
    fn test_failure_counts_rank_repeat_offenders() {
        let ledger = RunLedger::new(":memory:").unwrap();

        ledger.record_cycle(&report(92, &["XVG", "FTT"])).unwrap();
        ledger.record_cycle(&report(93, &["XVG"])).unwrap();

        let counts = ledger.failure_counts(5).unwrap();
        assert_eq!(counts[0], ("XVG".to_string(), 2));
        assert_eq!(counts[1], ("FTT".to_string(), 1));
    }

    #[test]
    fn test_recent_cycles_respects_limit() {
        let ledger = RunLedger::new(":memory:").unwrap();
        for i in 0..5 {
            ledger.record_cycle(&report(i, &[])).unwrap();
        }
        assert_eq!(ledger.recent_cycles(3).unwrap().len(), 3);
    }
}
