//! # Tickvault Warehouse
//!
//! DuckDB-based storage engine for daily tick partitions.
//!
//! ## Overview
//!
//! Each calendar day of tick data lives in its own database file. This crate
//! provides the primitives the lifecycle controllers need over one such file:
//!
//! - 🏗️ **Create**: staged creation with schema, views and performance parameters
//! - 💾 **Checkpoint**: merge the write-ahead log into the main file
//! - 🔍 **Consistency check**: read-only scan of every table plus tick invariants
//! - 🔒 **Secure SQL**: tick values are always bound as parameters
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use tickvault_warehouse::{DuckDbEngine, SchemaSource, StorageEngine, TickRecord};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = DuckDbEngine::new(SchemaSource::BuiltIn);
//!     let path = Path::new("data/ticks/2026/10/ticks_2026-10-19.db");
//!
//!     engine.create_partition(path)?;
//!     engine.insert_ticks(path, &[TickRecord::quote("EURUSD", 1_760_000_000_000, 1.0712, 1.0714)])?;
//!     engine.checkpoint(path)?;
//!
//!     let report = engine.integrity_check(path)?;
//!     println!("ok={} ticks={}", report.ok, report.tick_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `ticks` | Top-of-book ticks, unique on `(symbol, timestamp_ms)` |
//! | `partition_settings` | Performance parameters writers must re-apply |
//! | `schema_migrations` | Applied built-in schema versions |
//!
//! ## Views
//!
//! | View | Description |
//! |------|-------------|
//! | `v_symbol_stats` | First/last tick and count per symbol |
//! | `v_lp_activity` | Tick count and average spread per liquidity provider |

pub mod duckdb;
pub mod error;
pub mod migrations;
pub mod models;
pub mod views;

use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::Connection;
use ::duckdb::ToSql;
use tracing::{debug, warn};

pub use crate::duckdb::{wal_path, AccessMode, PerformanceParameters};
pub use crate::error::WarehouseError;
pub use crate::models::{IntegrityReport, TickRecord};

use crate::duckdb::{apply_performance_parameters, open_partition, quote_identifier};

/// Where a new partition's schema comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    /// The built-in tick schema, migrations and views.
    BuiltIn,
    /// SQL read from an operator-supplied schema file.
    File(PathBuf),
}

impl SchemaSource {
    fn apply(&self, connection: &Connection) -> Result<(), WarehouseError> {
        match self {
            Self::BuiltIn => {
                migrations::apply_migrations(connection)?;
                views::create_views(connection)?;
            }
            Self::File(path) => {
                let sql = fs::read_to_string(path).map_err(|error| {
                    WarehouseError::SchemaRejected(format!(
                        "cannot read schema file {}: {error}",
                        path.display()
                    ))
                })?;
                connection.execute_batch(sql.as_str()).map_err(|error| {
                    WarehouseError::SchemaRejected(format!(
                        "schema file {} failed to apply: {error}",
                        path.display()
                    ))
                })?;
            }
        }
        Ok(())
    }
}

/// Storage-engine primitives over a single partition file.
pub trait StorageEngine: Send + Sync {
    /// Create a new partition at `path`: schema, performance parameters and a
    /// consistency check. The file only appears under its final name once it
    /// is complete.
    fn create_partition(&self, path: &Path) -> Result<IntegrityReport, WarehouseError>;

    /// Apply and persist the engine's performance parameters.
    fn set_performance_parameters(&self, path: &Path) -> Result<(), WarehouseError>;

    /// Merge the write-ahead log into the main file.
    fn checkpoint(&self, path: &Path) -> Result<(), WarehouseError>;

    /// Read-only structural and invariant check.
    ///
    /// A file that cannot be opened yields a failed report, except when
    /// another process holds its lock: that is [`WarehouseError::PartitionLocked`].
    fn integrity_check(&self, path: &Path) -> Result<IntegrityReport, WarehouseError>;

    /// Number of ticks stored in the partition.
    fn tick_count(&self, path: &Path) -> Result<i64, WarehouseError>;
}

/// The `DuckDB` storage engine.
#[derive(Debug, Clone)]
pub struct DuckDbEngine {
    schema: SchemaSource,
    parameters: PerformanceParameters,
}

impl Default for DuckDbEngine {
    fn default() -> Self {
        Self::new(SchemaSource::BuiltIn)
    }
}

impl DuckDbEngine {
    #[must_use]
    pub fn new(schema: SchemaSource) -> Self {
        Self {
            schema,
            parameters: PerformanceParameters::default(),
        }
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: PerformanceParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn schema(&self) -> &SchemaSource {
        &self.schema
    }

    /// Insert ticks in a single transaction using parameterized queries.
    ///
    /// # Security
    /// Every tick value is bound as a parameter, never interpolated.
    pub fn insert_ticks(&self, path: &Path, rows: &[TickRecord]) -> Result<usize, WarehouseError> {
        ensure_exists(path)?;
        if rows.is_empty() {
            return Ok(0);
        }

        let connection = open_partition(path, AccessMode::ReadWrite)?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, WarehouseError> {
            for row in rows {
                let params: [&dyn ToSql; 8] = [
                    &row.symbol,
                    &row.timestamp_ms,
                    &row.bid,
                    &row.ask,
                    &row.spread,
                    &row.volume,
                    &row.lp_source,
                    &row.flags,
                ];
                connection.execute(
                    "INSERT INTO ticks \
                     (symbol, timestamp_ms, bid, ask, spread, volume, lp_source, flags) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                    params.as_slice(),
                )?;
            }
            Ok(rows.len())
        })();

        finalize_transaction(&connection, result)
    }

    fn record_performance_parameters(&self, connection: &Connection) -> Result<(), WarehouseError> {
        connection.execute_batch(
            "CREATE TABLE IF NOT EXISTS partition_settings (
                name VARCHAR PRIMARY KEY,
                value VARCHAR NOT NULL,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );",
        )?;
        for (name, value) in self.parameters.as_settings() {
            let params: [&dyn ToSql; 2] = [&name, &value];
            connection.execute(
                "INSERT OR REPLACE INTO partition_settings (name, value, updated_at) \
                 VALUES (?, ?, CURRENT_TIMESTAMP)",
                params.as_slice(),
            )?;
        }
        Ok(())
    }
}

impl StorageEngine for DuckDbEngine {
    fn create_partition(&self, path: &Path) -> Result<IntegrityReport, WarehouseError> {
        if path.exists() {
            return Err(WarehouseError::PartitionExists {
                path: path.to_path_buf(),
            });
        }

        let staging = staging_path(path);
        remove_if_exists(staging.as_path())?;
        remove_if_exists(wal_path(&staging).as_path())?;

        let built = (|| -> Result<(), WarehouseError> {
            let connection = open_partition(staging.as_path(), AccessMode::ReadWrite)?;
            self.schema.apply(&connection)?;
            apply_performance_parameters(&connection, &self.parameters)?;
            self.record_performance_parameters(&connection)?;
            connection.execute_batch("FORCE CHECKPOINT;")?;
            Ok(())
        })();
        if let Err(error) = built {
            let _ = remove_if_exists(staging.as_path());
            let _ = remove_if_exists(wal_path(&staging).as_path());
            return Err(error);
        }

        let staging_wal = wal_path(&staging);
        if staging_wal.exists() {
            fs::rename(staging_wal.as_path(), wal_path(path))?;
        }
        fs::rename(staging.as_path(), path)?;
        debug!(path = %path.display(), "partition file created");

        let report = self.integrity_check(path)?;
        if !report.ok {
            warn!(path = %path.display(), issue = %report.summary(), "new partition failed its consistency check");
            remove_if_exists(path)?;
            remove_if_exists(wal_path(path).as_path())?;
        }
        Ok(report)
    }

    fn set_performance_parameters(&self, path: &Path) -> Result<(), WarehouseError> {
        ensure_exists(path)?;
        let connection = open_partition(path, AccessMode::ReadWrite)?;
        apply_performance_parameters(&connection, &self.parameters)?;
        self.record_performance_parameters(&connection)
    }

    fn checkpoint(&self, path: &Path) -> Result<(), WarehouseError> {
        ensure_exists(path)?;
        let connection = open_partition(path, AccessMode::ReadWrite)?;
        connection.execute_batch("FORCE CHECKPOINT;")?;
        Ok(())
    }

    fn integrity_check(&self, path: &Path) -> Result<IntegrityReport, WarehouseError> {
        ensure_exists(path)?;
        let connection = match open_partition(path, AccessMode::ReadOnly) {
            Ok(connection) => connection,
            Err(error) => {
                let error = WarehouseError::from(error);
                if error.is_lock_conflict() {
                    return Err(WarehouseError::PartitionLocked {
                        path: path.to_path_buf(),
                        detail: error.to_string(),
                    });
                }
                return Ok(IntegrityReport::failed(format!(
                    "cannot open partition: {error}"
                )));
            }
        };
        Ok(run_consistency_check(&connection))
    }

    fn tick_count(&self, path: &Path) -> Result<i64, WarehouseError> {
        ensure_exists(path)?;
        let connection = open_partition(path, AccessMode::ReadOnly)?;
        let count = connection.query_row("SELECT COUNT(*) FROM ticks", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Finalize a transaction, committing on success or rolling back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

/// Scan every user table and check tick invariants when a `ticks` table exists.
fn run_consistency_check(connection: &Connection) -> IntegrityReport {
    let tables = match list_tables(connection) {
        Ok(tables) => tables,
        Err(error) => return IntegrityReport::failed(format!("cannot list tables: {error}")),
    };

    let mut report = IntegrityReport {
        table_count: tables.len(),
        ..IntegrityReport::default()
    };

    for table in &tables {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));
        if let Err(error) = connection.query_row(sql.as_str(), [], |row| row.get::<_, i64>(0)) {
            report.issues.push(format!("table {table} failed to scan: {error}"));
        }
    }

    if tables.iter().any(|table| table == "ticks") && has_tick_columns(connection) {
        if let Err(error) = read_tick_stats(connection, &mut report) {
            report.issues.push(format!("tick statistics failed: {error}"));
        }
    }

    if report.invariant_violations > 0 {
        report.issues.push(format!(
            "{} ticks violate ask >= bid or the spread tolerance",
            report.invariant_violations
        ));
    }

    report.ok = report.issues.is_empty();
    report
}

fn list_tables(connection: &Connection) -> Result<Vec<String>, ::duckdb::Error> {
    let mut statement = connection.prepare(
        "SELECT table_name FROM duckdb_tables() \
         WHERE database_name = current_database() AND NOT internal AND NOT temporary \
         ORDER BY table_name",
    )?;
    let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
    rows.collect()
}

fn has_tick_columns(connection: &Connection) -> bool {
    connection
        .query_row(
            "SELECT COUNT(*) FROM duckdb_columns() \
             WHERE database_name = current_database() AND table_name = 'ticks' \
             AND column_name IN ('symbol', 'timestamp_ms', 'bid', 'ask', 'spread')",
            [],
            |row| row.get::<_, i64>(0),
        )
        .map(|count| count == 5)
        .unwrap_or(false)
}

fn read_tick_stats(
    connection: &Connection,
    report: &mut IntegrityReport,
) -> Result<(), ::duckdb::Error> {
    let (tick_count, symbol_count, first, last) = connection.query_row(
        "SELECT COUNT(*), COUNT(DISTINCT symbol), MIN(timestamp_ms), MAX(timestamp_ms) FROM ticks",
        [],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, Option<i64>>(3)?,
            ))
        },
    )?;
    report.tick_count = tick_count;
    report.symbol_count = symbol_count;
    report.first_tick_ms = first;
    report.last_tick_ms = last;

    report.invariant_violations = connection.query_row(
        "SELECT COUNT(*) FROM ticks WHERE ask < bid OR abs(spread - (ask - bid)) >= 0.000001",
        [],
        |row| row.get(0),
    )?;
    Ok(())
}

fn ensure_exists(path: &Path) -> Result<(), WarehouseError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(WarehouseError::MissingPartition {
            path: path.to_path_buf(),
        })
    }
}

/// Staging name a partition is built under before it is renamed into place.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

fn remove_if_exists(path: &Path) -> Result<(), std::io::Error> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn partition_path(root: &Path) -> PathBuf {
        let dir = root.join("2026").join("10");
        fs::create_dir_all(&dir).expect("create dirs");
        dir.join("ticks_2026-10-19.db")
    }

    #[test]
    fn creates_partition_with_schema_and_settings() {
        let temp = tempdir().expect("tempdir");
        let path = partition_path(temp.path());
        let engine = DuckDbEngine::default();

        let report = engine.create_partition(&path).expect("create");

        assert!(report.ok, "fresh partition should pass: {:?}", report.issues);
        assert!(path.is_file());
        assert!(!staging_path(&path).exists(), "staging file must be renamed away");
        assert_eq!(report.tick_count, 0);

        let connection = open_partition(&path, AccessMode::ReadOnly).expect("open");
        let settings: i64 = connection
            .query_row("SELECT COUNT(*) FROM partition_settings", [], |row| row.get(0))
            .expect("settings");
        assert_eq!(settings, 3);
    }

    #[test]
    fn refuses_to_create_over_existing_partition() {
        let temp = tempdir().expect("tempdir");
        let path = partition_path(temp.path());
        let engine = DuckDbEngine::default();
        engine.create_partition(&path).expect("create");

        let error = engine.create_partition(&path).expect_err("second create must fail");
        assert!(matches!(error, WarehouseError::PartitionExists { .. }));
    }

    #[test]
    fn stale_staging_file_is_replaced() {
        let temp = tempdir().expect("tempdir");
        let path = partition_path(temp.path());
        fs::write(staging_path(&path), b"half-written garbage").expect("write staging");

        let report = DuckDbEngine::default().create_partition(&path).expect("create");
        assert!(report.ok);
    }

    #[test]
    fn insert_then_checkpoint_keeps_ticks() {
        let temp = tempdir().expect("tempdir");
        let path = partition_path(temp.path());
        let engine = DuckDbEngine::default();
        engine.create_partition(&path).expect("create");

        let ticks = vec![
            TickRecord::quote("EURUSD", 1_000, 1.0712, 1.0714),
            TickRecord::quote("EURUSD", 2_000, 1.0713, 1.0715),
            TickRecord::quote("GBPUSD", 1_000, 1.2501, 1.2504),
        ];
        assert_eq!(engine.insert_ticks(&path, &ticks).expect("insert"), 3);
        engine.checkpoint(&path).expect("checkpoint");

        let report = engine.integrity_check(&path).expect("check");
        assert!(report.ok);
        assert_eq!(report.tick_count, 3);
        assert_eq!(report.symbol_count, 2);
        assert_eq!(report.first_tick_ms, Some(1_000));
        assert_eq!(report.last_tick_ms, Some(2_000));
        assert_eq!(engine.tick_count(&path).expect("count"), 3);
    }

    #[test]
    fn duplicate_tick_rolls_back_whole_batch() {
        let temp = tempdir().expect("tempdir");
        let path = partition_path(temp.path());
        let engine = DuckDbEngine::default();
        engine.create_partition(&path).expect("create");

        let ticks = vec![
            TickRecord::quote("EURUSD", 1_000, 1.0712, 1.0714),
            TickRecord::quote("EURUSD", 1_000, 1.0712, 1.0714),
        ];
        assert!(engine.insert_ticks(&path, &ticks).is_err());
        assert_eq!(engine.tick_count(&path).expect("count"), 0);
    }

    #[test]
    fn symbol_with_sql_is_stored_verbatim() {
        let temp = tempdir().expect("tempdir");
        let path = partition_path(temp.path());
        let engine = DuckDbEngine::default();
        engine.create_partition(&path).expect("create");

        let dangerous = r#"EURUSD'; DROP TABLE ticks; --"#;
        engine
            .insert_ticks(&path, &[TickRecord::quote(dangerous, 1, 1.0, 1.1)])
            .expect("insert");

        let connection = open_partition(&path, AccessMode::ReadOnly).expect("open");
        let stored: String = connection
            .query_row("SELECT symbol FROM ticks", [], |row| row.get(0))
            .expect("select");
        assert_eq!(stored, dangerous);
    }

    #[test]
    fn corrupt_file_fails_integrity_check() {
        let temp = tempdir().expect("tempdir");
        let path = partition_path(temp.path());
        fs::write(&path, vec![0xAB; 8192]).expect("write garbage");

        let report = DuckDbEngine::default().integrity_check(&path).expect("check runs");
        assert!(!report.ok);
        assert!(!report.issues.is_empty());
    }

    #[test]
    fn missing_partition_is_reported() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("ticks_2026-10-19.db");

        let error = DuckDbEngine::default().checkpoint(&path).expect_err("missing");
        assert!(matches!(error, WarehouseError::MissingPartition { .. }));
        assert!(!path.exists(), "checkpoint must not create a missing partition");
    }

    #[test]
    fn custom_schema_file_is_applied() {
        let temp = tempdir().expect("tempdir");
        let schema = temp.path().join("schema.sql");
        fs::write(
            &schema,
            "CREATE TABLE ticks (symbol VARCHAR, timestamp_ms BIGINT, bid DOUBLE, ask DOUBLE, spread DOUBLE);",
        )
        .expect("write schema");
        let path = partition_path(temp.path());

        let engine = DuckDbEngine::new(SchemaSource::File(schema));
        let report = engine.create_partition(&path).expect("create");
        assert!(report.ok);
        assert_eq!(report.table_count, 2, "ticks plus partition_settings");
    }

    #[test]
    fn unreadable_schema_file_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let path = partition_path(temp.path());
        let engine = DuckDbEngine::new(SchemaSource::File(temp.path().join("missing.sql")));

        let error = engine.create_partition(&path).expect_err("must fail");
        assert!(matches!(error, WarehouseError::SchemaRejected(_)));
        assert!(!path.exists());
        assert!(!staging_path(&path).exists(), "failed build must clean up staging");
    }
}
