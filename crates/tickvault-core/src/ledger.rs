//! Persisted per-partition lifecycle state.
//!
//! `partition_ledger.json` under the root records the state of every
//! partition the manager has touched. Partitions without an entry get a
//! state derived from the filesystem, so a fresh or lost ledger never
//! blocks rotation.
//!
//! | State        | Meaning                                       |
//! |--------------|-----------------------------------------------|
//! | `CREATED`    | pre-created for a future day                  |
//! | `ACTIVE`     | today's partition, receiving writes           |
//! | `ROTATING`   | close in progress (retried on the next run)   |
//! | `CLOSED`     | checkpointed and verified                     |
//! | `BACKED_UP`  | closed and copied to the backup directory     |
//! | `COMPRESSED` | replaced (or joined) by a `.db.zst` file      |
//! | `ARCHIVED`   | moved out of the root by retention            |
//! | `DELETED`    | removed by retention                          |

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::Date;
use tracing::warn;

use crate::error::LifecycleError;
use crate::files::{atomic_write_json, file_size};
use crate::metadata::now_rfc3339;
use crate::naming::{compressed_path, date_key, serde_date};

pub const LEDGER_FILE_NAME: &str = "partition_ledger.json";
const LEDGER_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartitionState {
    Created,
    Active,
    Rotating,
    Closed,
    BackedUp,
    Compressed,
    Archived,
    Deleted,
}

impl PartitionState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Active => "ACTIVE",
            Self::Rotating => "ROTATING",
            Self::Closed => "CLOSED",
            Self::BackedUp => "BACKED_UP",
            Self::Compressed => "COMPRESSED",
            Self::Archived => "ARCHIVED",
            Self::Deleted => "DELETED",
        }
    }

    /// States from which rotation still has to checkpoint and verify.
    pub const fn needs_close(self) -> bool {
        matches!(
            self,
            Self::Created | Self::Active | Self::Rotating | Self::Closed
        )
    }

    /// The partition no longer lives under the root.
    pub const fn is_gone(self) -> bool {
        matches!(self, Self::Archived | Self::Deleted)
    }
}

impl Display for PartitionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    #[serde(with = "serde_date")]
    pub date: Date,
    pub path: PathBuf,
    pub state: PartitionState,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    version: u32,
    partitions: BTreeMap<String, Partition>,
}

#[derive(Debug)]
pub struct PartitionLedger {
    path: PathBuf,
    entries: BTreeMap<String, Partition>,
}

impl PartitionLedger {
    /// Load the ledger under `root`. A missing or unreadable ledger starts empty.
    pub fn load(root: &Path) -> Result<Self, LifecycleError> {
        let path = root.join(LEDGER_FILE_NAME);
        let entries = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<LedgerFile>(&bytes) {
                Ok(file) => file.partitions,
                Err(error) => {
                    warn!(ledger = %path.display(), %error, "partition ledger unreadable, deriving state from files");
                    BTreeMap::new()
                }
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(error) => return Err(LifecycleError::io(&path, error)),
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, date: Date) -> Option<&Partition> {
        self.entries.get(&date_key(date))
    }

    pub fn entries(&self) -> impl Iterator<Item = &Partition> {
        self.entries.values()
    }

    /// Recorded state, or the state implied by the files on disk.
    pub fn state_of(&self, date: Date, path: &Path, today: Date) -> Option<PartitionState> {
        self.get(date)
            .map(|entry| entry.state)
            .or_else(|| derive_state(date, path, today))
    }

    /// Move a partition to `state`, refreshing its size and clearing any error.
    pub fn transition(&mut self, date: Date, path: &Path, state: PartitionState) -> &mut Partition {
        let size_bytes = file_size(path).unwrap_or(0);
        let entry = self
            .entries
            .entry(date_key(date))
            .or_insert_with(|| Partition {
                date,
                path: path.to_path_buf(),
                state,
                size_bytes,
                tick_count: None,
                compression_ratio: None,
                last_error: None,
                updated_at: String::new(),
            });
        entry.path = path.to_path_buf();
        entry.state = state;
        entry.size_bytes = size_bytes;
        entry.last_error = None;
        entry.updated_at = now_rfc3339();
        entry
    }

    /// Record a failure without changing the state.
    pub fn record_error(&mut self, date: Date, path: &Path, today: Date, error: &LifecycleError) {
        let state = self
            .state_of(date, path, today)
            .unwrap_or(PartitionState::Closed);
        let message = error.to_string();
        let entry = self.transition(date, path, state);
        entry.last_error = Some(message);
    }

    pub fn save(&self) -> Result<(), LifecycleError> {
        let file = LedgerFile {
            version: LEDGER_VERSION,
            partitions: self.entries.clone(),
        };
        atomic_write_json(&self.path, &file)
    }

    /// Save, logging instead of failing. Used between steps of a batch.
    pub fn persist(&self) {
        if let Err(error) = self.save() {
            warn!(ledger = %self.path.display(), %error, "failed to persist partition ledger");
        }
    }
}

/// State implied by the filesystem for a partition without a ledger entry.
pub fn derive_state(date: Date, path: &Path, today: Date) -> Option<PartitionState> {
    if path.is_file() {
        return Some(match date.cmp(&today) {
            std::cmp::Ordering::Greater => PartitionState::Created,
            std::cmp::Ordering::Equal => PartitionState::Active,
            std::cmp::Ordering::Less => PartitionState::Closed,
        });
    }
    compressed_path(path)
        .is_file()
        .then_some(PartitionState::Compressed)
}
