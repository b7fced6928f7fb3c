//! `DuckDB` connection handling for single partition files.

use std::path::{Path, PathBuf};

use ::duckdb::{Config, Connection};

/// Access mode for partition connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Read-only access. The file must already exist.
    ReadOnly,
    /// Read-write access. Creates the file if it does not exist.
    ReadWrite,
}

/// Performance parameters applied to every read-write partition connection.
///
/// The values are also persisted in the `partition_settings` table so that
/// ingestion writers opening the partition later can re-apply them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerformanceParameters {
    /// WAL size that triggers an automatic checkpoint (e.g. `16MB`).
    pub checkpoint_threshold: String,
    /// Worker threads the engine may use for a single connection.
    pub threads: u32,
    /// Whether insertion order must be preserved by scans.
    pub preserve_insertion_order: bool,
}

impl Default for PerformanceParameters {
    fn default() -> Self {
        Self {
            checkpoint_threshold: String::from("16MB"),
            threads: 2,
            preserve_insertion_order: false,
        }
    }
}

impl PerformanceParameters {
    /// Settings as `(name, value)` pairs in the order they are applied.
    pub fn as_settings(&self) -> Vec<(&'static str, String)> {
        vec![
            ("checkpoint_threshold", self.checkpoint_threshold.clone()),
            ("threads", self.threads.max(1).to_string()),
            (
                "preserve_insertion_order",
                self.preserve_insertion_order.to_string(),
            ),
        ]
    }
}

/// Open a connection to a partition file.
///
/// # Errors
/// Returns an error if the database file cannot be opened or configured.
pub fn open_partition(path: &Path, mode: AccessMode) -> Result<Connection, ::duckdb::Error> {
    let connection = match mode {
        AccessMode::ReadOnly => {
            let config = Config::default().access_mode(::duckdb::AccessMode::ReadOnly)?;
            Connection::open_with_flags(path, config)?
        }
        AccessMode::ReadWrite => Connection::open(path)?,
    };
    configure_connection(&connection)?;
    Ok(connection)
}

/// Apply performance parameters to an open read-write connection.
///
/// # Errors
/// Returns an error if a `SET` statement is rejected by the engine.
pub fn apply_performance_parameters(
    connection: &Connection,
    parameters: &PerformanceParameters,
) -> Result<(), ::duckdb::Error> {
    for (name, value) in parameters.as_settings() {
        let statement = match name {
            "checkpoint_threshold" => {
                format!("SET checkpoint_threshold = '{}';", escape_sql_string(&value))
            }
            _ => format!("SET {name} = {value};"),
        };
        connection.execute_batch(statement.as_str())?;
    }
    Ok(())
}

/// Path of the write-ahead log the engine keeps next to a partition file.
#[must_use]
pub fn wal_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".wal");
    PathBuf::from(name)
}

fn configure_connection(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch("PRAGMA disable_progress_bar;")
}

pub(crate) fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

pub(crate) fn quote_identifier(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}
