//! Day-boundary rotation.
//!
//! One call to [`RotationController::rotate`] closes yesterday's partition
//! (checkpoint, consistency check, optional backup), makes sure today's
//! partition exists, records the new pointers in `rotation_metadata.json`
//! and pre-creates tomorrow's partition.
//!
//! Failures on yesterday's partition are recorded and isolated. Failing to
//! create today's partition is fatal because ingestion cannot proceed
//! without it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tickvault_warehouse::StorageEngine;
use time::Date;
use tracing::{info, info_span, warn};

use crate::config::ValidatedConfig;
use crate::error::{LifecycleError, ValidationError};
use crate::files::copy_verified;
use crate::ledger::{PartitionLedger, PartitionState};
use crate::lock::lease_for;
use crate::metadata::{now_rfc3339, MetadataStore, RotationMetadata};
use crate::naming::{date_key, month_dir, partition_path, relative_path};
use crate::report::BatchSummary;
use crate::validation::FilenameValidator;

#[derive(Debug, Clone, Serialize)]
pub struct RotationReport {
    pub today: String,
    pub previous_date: String,
    pub dry_run: bool,
    pub current_partition: PathBuf,
    pub previous_partition: PathBuf,
    pub next_partition: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RotationMetadata>,
    #[serde(flatten)]
    pub summary: BatchSummary,
}

pub struct RotationController {
    config: ValidatedConfig,
    engine: Arc<dyn StorageEngine>,
}

impl RotationController {
    pub fn new(config: ValidatedConfig, engine: Arc<dyn StorageEngine>) -> Self {
        Self { config, engine }
    }

    pub fn config(&self) -> &ValidatedConfig {
        &self.config
    }

    /// Rotate partitions for the calendar day `today`.
    ///
    /// # Errors
    /// Fatal errors only: lease contention, date overflow, or failure to
    /// create today's partition.
    pub fn rotate(&self, today: Date) -> Result<RotationReport, LifecycleError> {
        let dry_run = self.config.dry_run();
        let span = info_span!("rotate", today = %date_key(today), dry_run);
        let _entered = span.enter();

        let out_of_range = || ValidationError::DateOutOfRange {
            date: date_key(today),
        };
        let yesterday = today.previous_day().ok_or_else(out_of_range)?;
        let tomorrow = today.next_day().ok_or_else(out_of_range)?;

        let _lease = lease_for(&self.config, "rotate")?;
        let mut ledger = PartitionLedger::load(self.config.root())?;
        let root = self.config.root();

        let mut report = RotationReport {
            today: date_key(today),
            previous_date: date_key(yesterday),
            dry_run,
            current_partition: partition_path(root, today),
            previous_partition: partition_path(root, yesterday),
            next_partition: partition_path(root, tomorrow),
            metadata: None,
            summary: BatchSummary::default(),
        };

        self.ensure_directory(today, &mut report.summary)
            .map_err(|error| LifecycleError::ActivePartition {
                path: report.current_partition.clone(),
                detail: error.to_string(),
            })?;
        if let Err(error) = self.ensure_directory(tomorrow, &mut report.summary) {
            report
                .summary
                .fail("ensure_directory", &root.join(month_dir(tomorrow)), &error);
        }

        if self.close_previous(yesterday, today, &mut ledger, &mut report.summary) {
            self.backup_previous(yesterday, &mut ledger, &mut report.summary);
        }

        self.activate_today(today, &mut ledger, &mut report.summary)?;

        let metadata = RotationMetadata {
            last_rotation: now_rfc3339(),
            current_date: date_key(today),
            previous_date: date_key(yesterday),
            current_db: report.current_partition.display().to_string(),
            previous_db: report.previous_partition.display().to_string(),
        };
        self.write_metadata(&metadata, &mut report.summary);
        report.metadata = Some(metadata);

        self.precreate(tomorrow, &mut ledger, &mut report.summary);

        if !dry_run {
            ledger.persist();
        }
        report.summary.log_summary("rotate");
        Ok(report)
    }

    fn ensure_directory(
        &self,
        date: Date,
        summary: &mut BatchSummary,
    ) -> Result<(), LifecycleError> {
        let dir = self.config.root().join(month_dir(date));
        if dir.is_dir() {
            return Ok(());
        }
        if self.config.dry_run() {
            info!(dir = %dir.display(), "[dry-run] would create directory");
        } else {
            std::fs::create_dir_all(&dir).map_err(|error| LifecycleError::io(&dir, error))?;
            info!(dir = %dir.display(), "created directory");
        }
        summary.succeed("ensure_directory", &dir, None);
        Ok(())
    }

    /// Checkpoint and verify yesterday's partition. True when it is ready for backup.
    fn close_previous(
        &self,
        yesterday: Date,
        today: Date,
        ledger: &mut PartitionLedger,
        summary: &mut BatchSummary,
    ) -> bool {
        const ACTION: &str = "close_previous";
        let path = partition_path(self.config.root(), yesterday);

        let state = match ledger.state_of(yesterday, &path, today) {
            None => {
                info!(path = %path.display(), "no partition for the previous day");
                summary.skip(ACTION, &path, "no partition");
                return false;
            }
            Some(state) if !state.needs_close() => {
                summary.skip(ACTION, &path, format!("already {state}"));
                return false;
            }
            Some(_) if !path.is_file() => {
                let error = LifecycleError::io(&path, std::io::ErrorKind::NotFound.into());
                summary.fail(ACTION, &path, &error);
                return false;
            }
            Some(state) => state,
        };

        if let Err(error) = FilenameValidator::partition_file(&path) {
            summary.fail(ACTION, &path, &error.into());
            return false;
        }

        if self.config.dry_run() {
            info!(path = %path.display(), %state, "[dry-run] would checkpoint and verify");
            return match self.engine.integrity_check(&path) {
                Ok(check) if check.ok => {
                    summary.succeed(ACTION, &path, Some(String::from("dry-run")));
                    true
                }
                Ok(check) => {
                    let error = LifecycleError::Integrity {
                        path: path.clone(),
                        detail: check.summary(),
                    };
                    summary.fail(ACTION, &path, &error);
                    false
                }
                Err(source) => {
                    summary.fail(ACTION, &path, &LifecycleError::storage(&path, source));
                    false
                }
            };
        }

        ledger.transition(yesterday, &path, PartitionState::Rotating);
        ledger.persist();

        let checked = self
            .engine
            .checkpoint(&path)
            .map_err(|source| self.classify_checkpoint_failure(&path, source))
            .and_then(|()| {
                self.engine
                    .integrity_check(&path)
                    .map_err(|source| LifecycleError::storage(&path, source))
            })
            .and_then(|check| {
                if check.ok {
                    Ok(check)
                } else {
                    Err(LifecycleError::Integrity {
                        path: path.clone(),
                        detail: check.summary(),
                    })
                }
            });

        match checked {
            Ok(check) => {
                let entry = ledger.transition(yesterday, &path, PartitionState::Closed);
                entry.tick_count = Some(check.tick_count);
                ledger.persist();
                info!(path = %path.display(), ticks = check.tick_count, "closed previous partition");
                summary.succeed(ACTION, &path, Some(format!("{} ticks", check.tick_count)));
                true
            }
            Err(error) => {
                ledger.record_error(yesterday, &path, today, &error);
                ledger.persist();
                summary.fail(ACTION, &path, &error);
                false
            }
        }
    }

    /// A checkpoint that fails on an unreadable file is reported as an integrity failure.
    /// A lock held by another process is a storage error: the file may be fine.
    fn classify_checkpoint_failure(
        &self,
        path: &Path,
        source: tickvault_warehouse::WarehouseError,
    ) -> LifecycleError {
        if source.is_lock_conflict() {
            warn!(path = %path.display(), error = %source, "partition still locked by its writer");
            return LifecycleError::storage(path, source);
        }
        match self.engine.integrity_check(path) {
            Ok(check) if !check.ok => LifecycleError::Integrity {
                path: path.to_path_buf(),
                detail: format!("checkpoint failed ({source}); {}", check.summary()),
            },
            _ => LifecycleError::storage(path, source),
        }
    }

    fn backup_previous(
        &self,
        yesterday: Date,
        ledger: &mut PartitionLedger,
        summary: &mut BatchSummary,
    ) {
        const ACTION: &str = "backup_previous";
        let source = partition_path(self.config.root(), yesterday);
        if !self.config.enable_backup() {
            summary.skip(ACTION, &source, "backup disabled");
            return;
        }
        let target = self.config.backup_dir().join(relative_path(yesterday));

        if self.config.dry_run() {
            info!(from = %source.display(), to = %target.display(), "[dry-run] would back up partition");
            summary.succeed(ACTION, &target, Some(String::from("dry-run")));
            return;
        }

        match copy_verified(&source, &target) {
            Ok(bytes) => {
                ledger.transition(yesterday, &source, PartitionState::BackedUp);
                ledger.persist();
                info!(to = %target.display(), bytes, "backed up previous partition");
                summary.succeed(ACTION, &target, Some(format!("{bytes} bytes")));
            }
            Err(error) => {
                let error = match error {
                    LifecycleError::Backup { .. } => error,
                    other => LifecycleError::Backup {
                        path: target.clone(),
                        detail: other.to_string(),
                    },
                };
                summary.fail(ACTION, &target, &error);
            }
        }
    }

    fn activate_today(
        &self,
        today: Date,
        ledger: &mut PartitionLedger,
        summary: &mut BatchSummary,
    ) -> Result<(), LifecycleError> {
        const ACTION: &str = "activate_today";
        let path = partition_path(self.config.root(), today);
        FilenameValidator::partition_file(&path)?;

        if path.is_file() {
            info!(path = %path.display(), "partition already exists");
            if !self.config.dry_run()
                && ledger.get(today).map_or(true, |entry| entry.state != PartitionState::Active)
            {
                ledger.transition(today, &path, PartitionState::Active);
            }
            summary.succeed(ACTION, &path, Some(String::from("already exists")));
            return Ok(());
        }

        if self.config.dry_run() {
            info!(path = %path.display(), "[dry-run] would create today's partition");
            summary.succeed(ACTION, &path, Some(String::from("dry-run")));
            return Ok(());
        }

        let check = self
            .engine
            .create_partition(&path)
            .map_err(|source| LifecycleError::ActivePartition {
                path: path.clone(),
                detail: source.to_string(),
            })?;
        if !check.ok {
            return Err(LifecycleError::ActivePartition {
                path,
                detail: check.summary(),
            });
        }

        ledger.transition(today, &path, PartitionState::Active);
        ledger.persist();
        info!(path = %path.display(), "created today's partition");
        summary.succeed(ACTION, &path, None);
        Ok(())
    }

    fn write_metadata(&self, metadata: &RotationMetadata, summary: &mut BatchSummary) {
        const ACTION: &str = "write_metadata";
        let store = MetadataStore::new(self.config.root());
        if self.config.dry_run() {
            info!(path = %store.path().display(), "[dry-run] would write rotation metadata");
            summary.succeed(ACTION, store.path(), Some(String::from("dry-run")));
            return;
        }
        match store.write(metadata) {
            Ok(()) => summary.succeed(ACTION, store.path(), None),
            Err(error) => summary.fail(ACTION, store.path(), &error),
        }
    }

    fn precreate(&self, tomorrow: Date, ledger: &mut PartitionLedger, summary: &mut BatchSummary) {
        const ACTION: &str = "precreate_tomorrow";
        let path = partition_path(self.config.root(), tomorrow);

        if path.is_file() {
            summary.skip(ACTION, &path, "already exists");
            return;
        }
        if self.config.dry_run() {
            info!(path = %path.display(), "[dry-run] would pre-create tomorrow's partition");
            summary.succeed(ACTION, &path, Some(String::from("dry-run")));
            return;
        }

        match self.engine.create_partition(&path) {
            Ok(check) if check.ok => {
                ledger.transition(tomorrow, &path, PartitionState::Created);
                summary.succeed(ACTION, &path, None);
            }
            Ok(check) => {
                warn!(path = %path.display(), issue = %check.summary(), "pre-created partition failed verification");
                let error = LifecycleError::Integrity {
                    path: path.clone(),
                    detail: check.summary(),
                };
                summary.fail(ACTION, &path, &error);
            }
            Err(source) => {
                summary.fail(ACTION, &path, &LifecycleError::storage(&path, source));
            }
        }
    }
}
