//! Age-gated compression of closed partitions and on-demand decompression.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tickvault_warehouse::{wal_path, StorageEngine};
use time::Date;
use tracing::{debug, info, info_span, warn};

use crate::codec::Codec;
use crate::config::ValidatedConfig;
use crate::error::{LifecycleError, ValidationError};
use crate::files::{collect_files, file_size, remove_if_exists};
use crate::ledger::{PartitionLedger, PartitionState};
use crate::lock::lease_for;
use crate::naming::{
    compressed_path, date_key, is_partition_candidate, parse_partition_date, staging_path,
};
use crate::report::BatchSummary;
use crate::validation::{check_compression_level, ensure_within, FilenameValidator};

const ACTION: &str = "compress";

#[derive(Debug, Clone, Serialize)]
pub struct CompressionReport {
    pub cutoff: String,
    pub level: u8,
    pub dry_run: bool,
    pub bytes_before: u64,
    pub bytes_after: u64,
    #[serde(flatten)]
    pub summary: BatchSummary,
}

/// Result of compressing one file.
#[derive(Debug, Clone, Serialize)]
pub struct CompressedFile {
    pub original: PathBuf,
    pub compressed: PathBuf,
    pub original_bytes: u64,
    pub compressed_bytes: u64,
    /// `compressed_bytes / original_bytes`.
    pub ratio: f64,
    pub original_removed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecompressionReport {
    pub compressed: PathBuf,
    pub decompressed: PathBuf,
    pub dry_run: bool,
    pub size_bytes: u64,
    pub tick_count: Option<i64>,
}

pub struct CompressionController {
    config: ValidatedConfig,
    engine: Arc<dyn StorageEngine>,
    codec: Arc<dyn Codec>,
}

impl CompressionController {
    pub fn new(
        config: ValidatedConfig,
        engine: Arc<dyn StorageEngine>,
        codec: Arc<dyn Codec>,
    ) -> Self {
        Self {
            config,
            engine,
            codec,
        }
    }

    /// Compress with the configured threshold and level.
    pub fn compress(&self, today: Date) -> Result<CompressionReport, LifecycleError> {
        self.compress_with(
            today,
            self.config.age_threshold_days(),
            self.config.compression_level(),
        )
    }

    /// Compress every partition dated strictly before `today - threshold_days`.
    ///
    /// # Errors
    /// Fatal errors only. Per-file failures are counted in the report.
    pub fn compress_with(
        &self,
        today: Date,
        threshold_days: u32,
        level: u8,
    ) -> Result<CompressionReport, LifecycleError> {
        let level = check_compression_level(u64::from(level))?;
        if threshold_days < 1 {
            return Err(ValidationError::InvalidAgeThreshold {
                value: threshold_days,
            }
            .into());
        }
        let cutoff = today
            .checked_sub(time::Duration::days(i64::from(threshold_days)))
            .ok_or_else(|| ValidationError::DateOutOfRange {
                date: date_key(today),
            })?;

        let dry_run = self.config.dry_run();
        let span = info_span!("compress", cutoff = %date_key(cutoff), level, dry_run);
        let _entered = span.enter();

        let (candidates, leftovers) = self.scan_candidates()?;
        let _lease = lease_for(&self.config, "compress")?;
        let mut ledger = PartitionLedger::load(self.config.root())?;

        let mut report = CompressionReport {
            cutoff: date_key(cutoff),
            level,
            dry_run,
            bytes_before: 0,
            bytes_after: 0,
            summary: BatchSummary::default(),
        };
        for path in candidates {
            self.process(&path, today, cutoff, level, &mut ledger, &mut report);
        }
        if !self.config.keep_original_after_compress() {
            for path in leftovers {
                self.finish_leftover(&path, today, cutoff, &mut ledger, &mut report);
            }
        }

        if !dry_run {
            ledger.persist();
        }
        report.summary.log_summary("compress");
        Ok(report)
    }

    /// Uncompressed partitions, split by whether a compressed sibling exists.
    ///
    /// Every `.db` name is allowlisted before anything is mutated.
    fn scan_candidates(&self) -> Result<(Vec<PathBuf>, Vec<PathBuf>), LifecycleError> {
        let files = collect_files(self.config.root(), is_partition_candidate)?;
        let mut candidates = Vec::with_capacity(files.len());
        let mut with_sibling = Vec::new();
        for path in files {
            FilenameValidator::partition_file(&path)?;
            if compressed_path(&path).exists() {
                with_sibling.push(path);
            } else {
                candidates.push(path);
            }
        }
        Ok((candidates, with_sibling))
    }

    /// Remove an original whose `.zst` was renamed into place by an earlier
    /// run that then failed to delete it.
    ///
    /// The ledger tells the cases apart: a completed compression or a
    /// decompressed restore is `COMPRESSED`, an interrupted one is not.
    fn finish_leftover(
        &self,
        path: &Path,
        today: Date,
        cutoff: Date,
        ledger: &mut PartitionLedger,
        report: &mut CompressionReport,
    ) {
        let Some(date) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(parse_partition_date)
        else {
            return;
        };
        let interrupted = date < cutoff
            && ledger.get(date).is_some_and(|entry| {
                entry.state.needs_close() || entry.state == PartitionState::BackedUp
            });
        if !interrupted {
            debug!(path = %path.display(), "compressed sibling exists");
            return;
        }

        if self.config.dry_run() {
            info!(path = %path.display(), "[dry-run] would remove original left by an earlier compression");
            report.summary.succeed(ACTION, path, Some(String::from("dry-run")));
            return;
        }

        let compressed = compressed_path(path);
        let original_bytes = file_size(path).unwrap_or(0);
        match self.remove_original(path, &compressed) {
            Ok(()) => {
                let compressed_bytes = file_size(&compressed).unwrap_or(0);
                let entry = ledger.transition(date, &compressed, PartitionState::Compressed);
                entry.compression_ratio = Some(ratio(compressed_bytes, original_bytes));
                ledger.persist();
                info!(path = %path.display(), "removed original left by an earlier compression");
                report.summary.succeed(
                    ACTION,
                    path,
                    Some(String::from("removed leftover original")),
                );
            }
            Err(error) => {
                ledger.record_error(date, path, today, &error);
                report.summary.fail(ACTION, path, &error);
            }
        }
    }

    fn process(
        &self,
        path: &Path,
        today: Date,
        cutoff: Date,
        level: u8,
        ledger: &mut PartitionLedger,
        report: &mut CompressionReport,
    ) {
        let summary = &mut report.summary;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(date) = parse_partition_date(&name) else {
            warn!(path = %path.display(), "cannot parse partition date, skipping");
            summary.skip(ACTION, path, "unparsable date");
            return;
        };
        if date >= cutoff {
            debug!(path = %path.display(), "too recent to compress");
            summary.skip(ACTION, path, "too recent");
            return;
        }

        if wal_path(path).exists() {
            let error = LifecycleError::Integrity {
                path: path.to_path_buf(),
                detail: String::from("write-ahead log not checkpointed"),
            };
            ledger.record_error(date, path, today, &error);
            summary.fail(ACTION, path, &error);
            return;
        }

        let tick_count = match self.engine.integrity_check(path) {
            Ok(check) if check.ok => check.tick_count,
            Ok(check) => {
                let error = LifecycleError::Integrity {
                    path: path.to_path_buf(),
                    detail: check.summary(),
                };
                ledger.record_error(date, path, today, &error);
                summary.fail(ACTION, path, &error);
                return;
            }
            Err(source) => {
                summary.fail(ACTION, path, &LifecycleError::storage(path, source));
                return;
            }
        };

        if self.config.dry_run() {
            info!(path = %path.display(), level, "[dry-run] would compress");
            summary.succeed(ACTION, path, Some(String::from("dry-run")));
            return;
        }

        match self.compress_file(path, level) {
            Ok(outcome) => {
                report.bytes_before += outcome.original_bytes;
                report.bytes_after += outcome.compressed_bytes;
                let entry = ledger.transition(date, &outcome.compressed, PartitionState::Compressed);
                entry.tick_count = Some(tick_count);
                entry.compression_ratio = Some(outcome.ratio);
                ledger.persist();
                info!(
                    path = %path.display(),
                    ratio = outcome.ratio,
                    removed = outcome.original_removed,
                    "compressed partition"
                );
                report.summary.succeed(
                    ACTION,
                    path,
                    Some(format!(
                        "{} -> {} bytes",
                        outcome.original_bytes, outcome.compressed_bytes
                    )),
                );
            }
            Err(error) => {
                ledger.record_error(date, path, today, &error);
                report.summary.fail(ACTION, path, &error);
            }
        }
    }

    /// Compress one partition file to its `.zst` sibling.
    ///
    /// The output is staged at `<name>.db.zst.partial` and renamed only after
    /// it is verified non-empty. The original is removed afterwards unless
    /// configured to keep it.
    pub fn compress_file(&self, path: &Path, level: u8) -> Result<CompressedFile, LifecycleError> {
        FilenameValidator::partition_file(path)?;
        let level = check_compression_level(u64::from(level))?;

        let target = compressed_path(path);
        if target.exists() {
            return Err(LifecycleError::Compression {
                path: path.to_path_buf(),
                detail: format!("{} already exists", target.display()),
            });
        }
        let original_bytes = file_size(path).ok_or_else(|| {
            LifecycleError::io(path, std::io::ErrorKind::NotFound.into())
        })?;

        let staging = staging_path(&target);
        remove_if_exists(&staging)?;
        if let Err(error) = self.codec.compress(path, &staging, level) {
            let _ = remove_if_exists(&staging);
            return Err(LifecycleError::Compression {
                path: path.to_path_buf(),
                detail: error.to_string(),
            });
        }
        let compressed_bytes = match file_size(&staging) {
            Some(size) if size > 0 => size,
            _ => {
                let _ = remove_if_exists(&staging);
                return Err(LifecycleError::Compression {
                    path: path.to_path_buf(),
                    detail: String::from("codec produced no output"),
                });
            }
        };
        std::fs::rename(&staging, &target).map_err(|error| LifecycleError::io(&target, error))?;

        let original_removed = if self.config.keep_original_after_compress() {
            false
        } else {
            self.remove_original(path, &target)?;
            true
        };

        Ok(CompressedFile {
            original: path.to_path_buf(),
            compressed: target,
            original_bytes,
            compressed_bytes,
            ratio: ratio(compressed_bytes, original_bytes),
            original_removed,
        })
    }

    fn remove_original(&self, path: &Path, compressed: &Path) -> Result<(), LifecycleError> {
        FilenameValidator::partition_file(path)?;
        if !file_size(compressed).is_some_and(|size| size > 0) {
            return Err(LifecycleError::Compression {
                path: path.to_path_buf(),
                detail: String::from("compressed file missing, original kept"),
            });
        }
        std::fs::remove_file(path).map_err(|error| LifecycleError::io(path, error))
    }

    /// Restore a `.db.zst` file next to itself and verify the result.
    ///
    /// Refuses to overwrite an existing partition. The compressed source is
    /// never removed.
    pub fn decompress(&self, compressed: &Path) -> Result<DecompressionReport, LifecycleError> {
        let (_, decompressed_name) = FilenameValidator::decompression_pair(
            compressed
                .file_name()
                .ok_or_else(|| ValidationError::FilenameRejected {
                    value: compressed.display().to_string(),
                    rule: crate::validation::COMPRESSED_NAME_RULE,
                })?,
        )?;
        if !compressed.is_file() {
            return Err(LifecycleError::io(
                compressed,
                std::io::ErrorKind::NotFound.into(),
            ));
        }
        let compressed = ensure_within(compressed, self.config.root())?;
        let target = compressed.with_file_name(&decompressed_name);

        let span = info_span!("decompress", path = %compressed.display());
        let _entered = span.enter();

        if target.exists() {
            return Err(LifecycleError::Decompression {
                path: compressed.clone(),
                detail: format!("{} already exists, refusing to overwrite", target.display()),
            });
        }

        if self.config.dry_run() {
            info!(to = %target.display(), "[dry-run] would decompress");
            return Ok(DecompressionReport {
                compressed,
                decompressed: target,
                dry_run: true,
                size_bytes: 0,
                tick_count: None,
            });
        }

        let _lease = lease_for(&self.config, "decompress")?;
        let staging = staging_path(&target);
        remove_if_exists(&staging)?;
        if let Err(error) = self.codec.decompress(&compressed, &staging) {
            let _ = remove_if_exists(&staging);
            return Err(LifecycleError::Decompression {
                path: compressed,
                detail: error.to_string(),
            });
        }
        let size_bytes = match file_size(&staging) {
            Some(size) if size > 0 => size,
            _ => {
                let _ = remove_if_exists(&staging);
                return Err(LifecycleError::Decompression {
                    path: compressed,
                    detail: String::from("codec produced no output"),
                });
            }
        };
        std::fs::rename(&staging, &target).map_err(|error| LifecycleError::io(&target, error))?;

        let check = match self.engine.integrity_check(&target) {
            Ok(check) => check,
            Err(source) => {
                let _ = remove_if_exists(&target);
                return Err(LifecycleError::storage(&target, source));
            }
        };
        if !check.ok {
            let _ = remove_if_exists(&target);
            return Err(LifecycleError::Integrity {
                path: target,
                detail: check.summary(),
            });
        }

        info!(to = %target.display(), ticks = check.tick_count, "decompressed partition");
        Ok(DecompressionReport {
            compressed,
            decompressed: target,
            dry_run: false,
            size_bytes,
            tick_count: Some(check.tick_count),
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(compressed: u64, original: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    compressed as f64 / original as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_of_empty_original_is_zero() {
        assert_eq!(ratio(10, 0), 0.0);
        assert!((ratio(25, 100) - 0.25).abs() < f64::EPSILON);
    }
}
