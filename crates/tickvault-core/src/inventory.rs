//! Read-only views over a partition tree: `status`, `list` and `inspect`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tickvault_warehouse::{IntegrityReport, StorageEngine};
use time::Date;
use tracing::warn;

use crate::config::ValidatedConfig;
use crate::error::LifecycleError;
use crate::files::{collect_files, file_size};
use crate::ledger::{derive_state, PartitionLedger, PartitionState};
use crate::lock::{LeaseInfo, LeaseLock};
use crate::metadata::{MetadataStore, RotationMetadata};
use crate::naming::{
    date_key, is_compressed_candidate, is_partition_candidate, parse_partition_date,
    partition_path, COMPRESSED_SUFFIX,
};
use crate::retention::RetentionTier;
use crate::validation::{ensure_within, FilenameValidator};

#[derive(Debug, Clone, Serialize)]
pub struct PartitionListing {
    pub date: String,
    pub path: PathBuf,
    pub state: PartitionState,
    pub tier: RetentionTier,
    pub size_bytes: u64,
    pub compressed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartitionPresence {
    pub path: PathBuf,
    pub exists: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub today: String,
    pub root: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_rotation: Option<RotationMetadata>,
    pub today_partition: PartitionPresence,
    pub tomorrow_partition: PartitionPresence,
    pub partitions_by_state: BTreeMap<PartitionState, usize>,
    pub partitions_by_tier: BTreeMap<RetentionTier, usize>,
    pub uncompressed_bytes: u64,
    pub compressed_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease: Option<LeaseInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub path: PathBuf,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub integrity: IntegrityReport,
}

pub struct Inventory {
    config: ValidatedConfig,
    engine: Arc<dyn StorageEngine>,
}

impl Inventory {
    pub fn new(config: ValidatedConfig, engine: Arc<dyn StorageEngine>) -> Self {
        Self { config, engine }
    }

    /// Every partition found on disk or recorded in the ledger, by date then path.
    pub fn list(&self, today: Date) -> Result<Vec<PartitionListing>, LifecycleError> {
        let ledger = PartitionLedger::load(self.config.root())?;
        let files = collect_files(self.config.root(), |name| {
            is_partition_candidate(name) || is_compressed_candidate(name)
        })?;

        let mut listings = Vec::new();
        let mut seen_dates = Vec::new();
        for path in files {
            if let Err(error) = FilenameValidator::any_partition_file(&path) {
                warn!(path = %path.display(), %error, "ignoring file with disallowed name");
                continue;
            }
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let Some(date) = parse_partition_date(&name) else {
                warn!(path = %path.display(), "ignoring file with unparsable date");
                continue;
            };
            let compressed = name.ends_with(COMPRESSED_SUFFIX);
            let entry = ledger.get(date);
            let state = if compressed {
                PartitionState::Compressed
            } else {
                entry
                    .map(|entry| entry.state)
                    .filter(|state| *state != PartitionState::Compressed)
                    .or_else(|| derive_state(date, &path, today))
                    .unwrap_or(PartitionState::Closed)
            };
            seen_dates.push(date);
            listings.push(PartitionListing {
                date: date_key(date),
                size_bytes: file_size(&path).unwrap_or(0),
                tier: self.tier(date, today),
                state,
                compressed,
                tick_count: entry.and_then(|entry| entry.tick_count),
                compression_ratio: entry
                    .filter(|_| compressed)
                    .and_then(|entry| entry.compression_ratio),
                last_error: entry.and_then(|entry| entry.last_error.clone()),
                path,
            });
        }

        for entry in ledger.entries() {
            if entry.state.is_gone() && !seen_dates.contains(&entry.date) {
                listings.push(PartitionListing {
                    date: date_key(entry.date),
                    path: entry.path.clone(),
                    state: entry.state,
                    tier: self.tier(entry.date, today),
                    size_bytes: file_size(&entry.path).unwrap_or(0),
                    compressed: entry.path.to_string_lossy().ends_with(COMPRESSED_SUFFIX),
                    tick_count: entry.tick_count,
                    compression_ratio: entry.compression_ratio,
                    last_error: entry.last_error.clone(),
                });
            }
        }

        listings.sort_by(|left, right| {
            left.date
                .cmp(&right.date)
                .then_with(|| left.path.cmp(&right.path))
        });
        Ok(listings)
    }

    pub fn status(&self, today: Date) -> Result<StatusReport, LifecycleError> {
        let root = self.config.root();
        let today_path = partition_path(root, today);
        let tomorrow_path = partition_path(root, today.next_day().unwrap_or(today));

        let mut report = StatusReport {
            today: date_key(today),
            root: root.to_path_buf(),
            last_rotation: MetadataStore::new(root).load()?,
            today_partition: PartitionPresence {
                exists: today_path.is_file(),
                path: today_path,
            },
            tomorrow_partition: PartitionPresence {
                exists: tomorrow_path.is_file(),
                path: tomorrow_path,
            },
            partitions_by_state: BTreeMap::new(),
            partitions_by_tier: BTreeMap::new(),
            uncompressed_bytes: 0,
            compressed_bytes: 0,
            lease: LeaseLock::for_config(&self.config).current(),
        };

        for listing in self.list(today)? {
            *report.partitions_by_state.entry(listing.state).or_default() += 1;
            if listing.state.is_gone() {
                continue;
            }
            *report.partitions_by_tier.entry(listing.tier).or_default() += 1;
            if listing.compressed {
                report.compressed_bytes += listing.size_bytes;
            } else {
                report.uncompressed_bytes += listing.size_bytes;
            }
        }
        Ok(report)
    }

    /// Run the consistency check on one partition inside the root.
    pub fn inspect(&self, path: &Path) -> Result<InspectReport, LifecycleError> {
        FilenameValidator::partition_file(path)?;
        if !path.is_file() {
            return Err(LifecycleError::io(path, std::io::ErrorKind::NotFound.into()));
        }
        let path = ensure_within(path, self.config.root())?;
        let integrity = self
            .engine
            .integrity_check(&path)
            .map_err(|source| LifecycleError::storage(&path, source))?;
        let date = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(parse_partition_date)
            .map(date_key);
        Ok(InspectReport {
            size_bytes: file_size(&path).unwrap_or(0),
            date,
            integrity,
            path,
        })
    }

    fn tier(&self, date: Date, today: Date) -> RetentionTier {
        RetentionTier::classify(
            date,
            today,
            self.config.age_threshold_days(),
            self.config.retention_days(),
        )
    }
}
