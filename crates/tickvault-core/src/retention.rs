//! Retention tiers and the cold-tier purge.
//!
//! | Tier | Age (days since partition date)            | Form          |
//! |------|--------------------------------------------|---------------|
//! | hot  | `age <= ageThresholdDays`                  | `.db`         |
//! | warm | `ageThresholdDays < age <= retentionDays`  | `.db.zst`     |
//! | cold | `age > retentionDays`                      | archived/gone |
//!
//! Tier boundaries match the operations exactly: compression takes
//! partitions dated strictly before `today - threshold`, purge takes those
//! dated strictly before `today - retention`.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tickvault_warehouse::wal_path;
use time::Date;
use tracing::{info, info_span, warn};

use crate::config::ValidatedConfig;
use crate::error::{LifecycleError, ValidationError};
use crate::files::{collect_files, move_file, remove_if_exists};
use crate::ledger::{PartitionLedger, PartitionState};
use crate::lock::lease_for;
use crate::naming::{
    date_key, is_compressed_candidate, is_partition_candidate, month_dir, parse_partition_date,
};
use crate::report::BatchSummary;
use crate::validation::FilenameValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionTier {
    Hot,
    Warm,
    Cold,
}

impl RetentionTier {
    pub fn classify(date: Date, today: Date, threshold_days: u32, retention_days: u32) -> Self {
        let age = (today - date).whole_days();
        if age <= i64::from(threshold_days) {
            Self::Hot
        } else if age <= i64::from(retention_days) {
            Self::Warm
        } else {
            Self::Cold
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Cold => "cold",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RetentionReport {
    pub horizon: String,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_dir: Option<PathBuf>,
    pub bytes_released: u64,
    #[serde(flatten)]
    pub summary: BatchSummary,
}

pub struct RetentionController {
    config: ValidatedConfig,
}

impl RetentionController {
    pub fn new(config: ValidatedConfig) -> Self {
        Self { config }
    }

    pub fn purge(&self, today: Date) -> Result<RetentionReport, LifecycleError> {
        self.purge_with(today, self.config.retention_days())
    }

    /// Archive or delete every partition file dated strictly before `today - retention_days`.
    ///
    /// # Errors
    /// Fatal errors only; a disallowed filename anywhere under the root
    /// aborts before anything is removed.
    pub fn purge_with(
        &self,
        today: Date,
        retention_days: u32,
    ) -> Result<RetentionReport, LifecycleError> {
        if retention_days <= self.config.age_threshold_days() {
            return Err(ValidationError::InvalidRetention {
                retention: retention_days,
                threshold: self.config.age_threshold_days(),
            }
            .into());
        }
        let horizon = today
            .checked_sub(time::Duration::days(i64::from(retention_days)))
            .ok_or_else(|| ValidationError::DateOutOfRange {
                date: date_key(today),
            })?;

        let dry_run = self.config.dry_run();
        let span = info_span!("purge", horizon = %date_key(horizon), dry_run);
        let _entered = span.enter();

        let files = collect_files(self.config.root(), |name| {
            is_partition_candidate(name) || is_compressed_candidate(name)
        })?;
        for path in &files {
            FilenameValidator::any_partition_file(path)?;
        }

        let _lease = lease_for(&self.config, "purge")?;
        let mut ledger = PartitionLedger::load(self.config.root())?;
        let mut report = RetentionReport {
            horizon: date_key(horizon),
            dry_run,
            archive_dir: self.config.archive_dir().map(Path::to_path_buf),
            bytes_released: 0,
            summary: BatchSummary::default(),
        };

        for path in files {
            self.process(&path, horizon, &mut ledger, &mut report);
        }

        if !dry_run {
            ledger.persist();
        }
        report.summary.log_summary("purge");
        Ok(report)
    }

    fn process(
        &self,
        path: &Path,
        horizon: Date,
        ledger: &mut PartitionLedger,
        report: &mut RetentionReport,
    ) {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(date) = parse_partition_date(&name) else {
            warn!(path = %path.display(), "cannot parse partition date, skipping");
            report.summary.skip("purge", path, "unparsable date");
            return;
        };
        if date >= horizon {
            report.summary.skip("purge", path, "within retention");
            return;
        }

        let size = std::fs::metadata(path).map(|metadata| metadata.len()).unwrap_or(0);
        match self.config.archive_dir() {
            Some(archive) => {
                let target = archive.join(month_dir(date)).join(&name);
                if self.config.dry_run() {
                    info!(from = %path.display(), to = %target.display(), "[dry-run] would archive");
                    report.summary.succeed("archive", path, Some(String::from("dry-run")));
                    return;
                }
                match self.archive_file(path, &target) {
                    Ok(()) => {
                        ledger.transition(date, &target, PartitionState::Archived);
                        ledger.persist();
                        report.bytes_released += size;
                        info!(to = %target.display(), "archived partition");
                        report.summary.succeed("archive", path, Some(target.display().to_string()));
                    }
                    Err(error) => report.summary.fail("archive", path, &error),
                }
            }
            None => {
                if self.config.dry_run() {
                    info!(path = %path.display(), "[dry-run] would delete");
                    report.summary.succeed("delete", path, Some(String::from("dry-run")));
                    return;
                }
                match delete_partition_file(path) {
                    Ok(()) => {
                        let entry = ledger.transition(date, path, PartitionState::Deleted);
                        entry.size_bytes = 0;
                        ledger.persist();
                        report.bytes_released += size;
                        info!(path = %path.display(), "deleted partition");
                        report.summary.succeed("delete", path, None);
                    }
                    Err(error) => report.summary.fail("delete", path, &error),
                }
            }
        }
    }

    fn archive_file(&self, path: &Path, target: &Path) -> Result<(), LifecycleError> {
        FilenameValidator::any_partition_file(path)?;
        if target.exists() {
            return Err(LifecycleError::io(
                target,
                std::io::ErrorKind::AlreadyExists.into(),
            ));
        }
        move_file(path, target)?;
        remove_if_exists(&wal_path(path))?;
        Ok(())
    }
}

/// Delete a partition file (and any stray WAL) after re-validating its name.
pub fn delete_partition_file(path: &Path) -> Result<(), LifecycleError> {
    FilenameValidator::any_partition_file(path)?;
    std::fs::remove_file(path).map_err(|error| LifecycleError::io(path, error))?;
    remove_if_exists(&wal_path(path))?;
    Ok(())
}
