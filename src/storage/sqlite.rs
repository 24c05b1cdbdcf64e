use crate::model::{CycleResult, Outcome, PriceStats, StorageError};
use crate::scheduler::CycleObserver;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens the database and creates the cycle history table.
    pub fn new(db_path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS cycle_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cycle_start TEXT NOT NULL,
                cycle_end TEXT NOT NULL,
                best_spp INTEGER NOT NULL,
                best_dest INTEGER NOT NULL,
                sample_count INTEGER NOT NULL,
                success_rate REAL NOT NULL,
                outcome_counts TEXT NOT NULL DEFAULT '{}'
            );
            ",
        )?;

        // Price statistics were added after the first schema.
        Self::migrate_add_column_if_missing(&conn, "cycle_results", "avg_price", "REAL")?;
        Self::migrate_add_column_if_missing(&conn, "cycle_results", "std_dev", "REAL")?;
        Self::migrate_add_column_if_missing(&conn, "cycle_results", "avg_discount_pct", "REAL")?;

        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        Self::new(":memory:")
    }

    fn migrate_add_column_if_missing(
        conn: &Connection,
        table: &str,
        column: &str,
        column_def: &str,
    ) -> Result<(), StorageError> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let existing_columns: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<_, _>>()?;

        if !existing_columns.iter().any(|c| c == column) {
            let alter_sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, column_def);
            conn.execute(&alter_sql, [])?;
        }

        Ok(())
    }

    pub fn save_cycle(&self, result: &CycleResult) -> Result<(), StorageError> {
        let outcome_counts: BTreeMap<&str, u64> = result
            .outcome_counts
            .iter()
            .map(|(outcome, count)| (outcome.as_str(), *count))
            .collect();
        let outcome_json = serde_json::to_string(&outcome_counts)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;

        self.conn.execute(
            "INSERT INTO cycle_results (
                cycle_start, cycle_end, best_spp, best_dest,
                sample_count, success_rate, outcome_counts, avg_price, std_dev,
                avg_discount_pct
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                result.cycle_start.to_rfc3339(),
                result.cycle_end.to_rfc3339(),
                i64::from(result.best_spp),
                result.best_dest,
                result.sample_count as i64,
                result.success_rate,
                outcome_json,
                result.price_stats.map(|s| s.avg_price),
                result.price_stats.map(|s| s.std_dev),
                result.price_stats.map(|s| s.avg_discount_pct),
            ],
        )?;
        Ok(())
    }

    /// Most recently completed cycle, if any was ever stored.
    pub fn latest_cycle(&self) -> Result<Option<CycleResult>, StorageError> {
        Ok(self.recent_cycles(1)?.into_iter().next())
    }

    /// Up to `limit` cycles, newest first.
    pub fn recent_cycles(&self, limit: usize) -> Result<Vec<CycleResult>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT cycle_start, cycle_end, best_spp, best_dest, sample_count,
                    success_rate, outcome_counts, avg_price, std_dev, avg_discount_pct
             FROM cycle_results ORDER BY id DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], Self::map_cycle)?;
        let mut cycles = Vec::new();
        for row in rows {
            cycles.push(row?);
        }
        Ok(cycles)
    }

    fn map_cycle(row: &Row) -> Result<CycleResult, rusqlite::Error> {
        let cycle_start = parse_time(row, 0)?;
        let cycle_end = parse_time(row, 1)?;
        let best_spp: i64 = row.get(2)?;
        let sample_count: i64 = row.get(4)?;
        let outcome_json: String = row.get(6)?;
        let avg_price: Option<f64> = row.get(7)?;
        let std_dev: Option<f64> = row.get(8)?;
        // Rows written before the discount column existed read back as 0.
        let avg_discount_pct: Option<f64> = row.get(9)?;

        let raw: BTreeMap<String, u64> = serde_json::from_str(&outcome_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let outcome_counts = raw
            .into_iter()
            .filter_map(|(name, count)| outcome_from_str(&name).map(|o| (o, count)))
            .collect();

        Ok(CycleResult {
            cycle_start,
            cycle_end,
            best_spp: u32::try_from(best_spp).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Integer, Box::new(e))
            })?,
            best_dest: row.get(3)?,
            sample_count: sample_count.max(0) as u64,
            success_rate: row.get(5)?,
            outcome_counts,
            price_stats: avg_price.zip(std_dev).map(|(avg_price, std_dev)| PriceStats {
                avg_price,
                std_dev,
                avg_discount_pct: avg_discount_pct.unwrap_or(0.0),
            }),
        })
    }
}

fn parse_time(row: &Row, idx: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn outcome_from_str(name: &str) -> Option<Outcome> {
    [
        Outcome::Success,
        Outcome::RateLimited,
        Outcome::NotFound,
        Outcome::Malformed,
        Outcome::NetworkError,
    ]
    .into_iter()
    .find(|o| o.as_str() == name)
}

#[async_trait::async_trait]
impl CycleObserver for Mutex<SqliteStorage> {
    async fn cycle_completed(&self, result: &CycleResult) {
        match self.lock().await.save_cycle(result) {
            Ok(()) => info!("💾 Cycle result saved"),
            Err(e) => warn!("DB save error: {:?}", e),
        }
    }
}
