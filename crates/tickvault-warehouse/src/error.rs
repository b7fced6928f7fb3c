use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during partition storage operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A custom schema file could not be read or applied.
    #[error("schema rejected: {0}")]
    SchemaRejected(String),

    /// The partition file does not exist.
    #[error("partition not found: {}", path.display())]
    MissingPartition { path: PathBuf },

    /// Refused to create over an existing partition file.
    #[error("partition already exists: {}", path.display())]
    PartitionExists { path: PathBuf },

    /// Another process holds the partition's file lock.
    #[error("partition locked by another process: {}: {detail}", path.display())]
    PartitionLocked { path: PathBuf, detail: String },
}

/// Fragments of DuckDB's message when another process holds the file lock.
const LOCK_CONFLICT_MARKERS: &[&str] = &["Could not set lock on file", "Conflicting lock is held"];

impl WarehouseError {
    /// Whether the failure is a file-lock conflict rather than a damaged file.
    pub fn is_lock_conflict(&self) -> bool {
        match self {
            Self::PartitionLocked { .. } => true,
            Self::DuckDb(_) | Self::Io(_) => {
                let message = self.to_string();
                LOCK_CONFLICT_MARKERS
                    .iter()
                    .any(|marker| message.contains(marker))
            }
            _ => false,
        }
    }
}
