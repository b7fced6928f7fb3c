//! Lifecycle configuration.
//!
//! A [`ConfigSpec`] is the raw, operator-provided description. It becomes
//! usable only through [`ConfigSpec::validate`], which returns an immutable
//! [`ValidatedConfig`] holding canonical directories and a parsed
//! compression level. Controllers accept nothing else.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ValidationError;
use crate::validation::{absolute_dir, canonical_dir, is_within, parse_compression_level};

pub const DEFAULT_ROOT_DIR: &str = "data/ticks";
pub const DEFAULT_ALLOWED_BASE_DIR: &str = "data";
pub const DEFAULT_BACKUP_DIR: &str = "data/backups/ticks";
pub const DEFAULT_COMPRESSION_LEVEL: &str = "19";
pub const DEFAULT_AGE_THRESHOLD_DAYS: u32 = 7;
pub const DEFAULT_RETENTION_DAYS: u32 = 180;
pub const DEFAULT_CODEC_PROGRAM: &str = "zstd";
pub const DEFAULT_CODEC_TIMEOUT: Duration = Duration::from_secs(3600);
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(30);
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(7200);
/// Upper bound for the lock wait and lease TTL.
pub const MAX_LOCK_DURATION: Duration = Duration::from_secs(7 * 24 * 3600);

/// Raw configuration as supplied by flags or environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSpec {
    pub root_dir: PathBuf,
    pub allowed_base_dir: PathBuf,
    pub schema_file: Option<PathBuf>,
    pub backup_dir: PathBuf,
    pub archive_dir: Option<PathBuf>,
    pub enable_backup: bool,
    pub verbose: bool,
    pub dry_run: bool,
    pub age_threshold_days: u32,
    /// Kept as text until validation so non-numeric input is reported verbatim.
    pub compression_level: String,
    pub keep_original_after_compress: bool,
    pub retention_days: u32,
    pub codec_program: String,
    pub codec_timeout: Duration,
    pub lock_wait: Duration,
    pub lock_ttl: Duration,
}

impl Default for ConfigSpec {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from(DEFAULT_ROOT_DIR),
            allowed_base_dir: PathBuf::from(DEFAULT_ALLOWED_BASE_DIR),
            schema_file: None,
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            archive_dir: None,
            enable_backup: true,
            verbose: true,
            dry_run: false,
            age_threshold_days: DEFAULT_AGE_THRESHOLD_DAYS,
            compression_level: String::from(DEFAULT_COMPRESSION_LEVEL),
            keep_original_after_compress: false,
            retention_days: DEFAULT_RETENTION_DAYS,
            codec_program: String::from(DEFAULT_CODEC_PROGRAM),
            codec_timeout: DEFAULT_CODEC_TIMEOUT,
            lock_wait: DEFAULT_LOCK_WAIT,
            lock_ttl: DEFAULT_LOCK_TTL,
        }
    }
}

impl ConfigSpec {
    /// Settings rooted at `root` with `base` as the allowed base and defaults elsewhere.
    pub fn for_root(root: impl Into<PathBuf>, base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            root_dir: root.into(),
            backup_dir: base.join("backups").join("ticks"),
            allowed_base_dir: base,
            ..Self::default()
        }
    }

    /// Validate every field. Performs no filesystem mutation.
    ///
    /// # Errors
    /// Returns a configuration error for malformed values and a security
    /// error when the root escapes the allowed base.
    pub fn validate(&self) -> Result<ValidatedConfig, ValidationError> {
        let compression_level = parse_compression_level(&self.compression_level)?;

        if self.age_threshold_days < 1 {
            return Err(ValidationError::InvalidAgeThreshold {
                value: self.age_threshold_days,
            });
        }
        if self.codec_program.trim().is_empty() {
            return Err(ValidationError::EmptyCodecProgram);
        }
        if self.codec_timeout.is_zero() {
            return Err(ValidationError::ZeroCodecTimeout);
        }
        bounded("lock wait", self.lock_wait)?;
        bounded("lock ttl", self.lock_ttl)?;

        let base = canonical_dir("allowed base", &self.allowed_base_dir)?;
        let root = canonical_dir("root", &self.root_dir)?;
        if !is_within(&root, &base) {
            return Err(ValidationError::PathEscapesBase {
                input: self.root_dir.display().to_string(),
                resolved: root,
                base,
            });
        }

        if let Some(schema) = &self.schema_file {
            if !schema.is_file() {
                return Err(ValidationError::SchemaFileNotFound {
                    path: schema.clone(),
                });
            }
        }

        let backup_dir = outside_root("backup", &self.backup_dir, &root)?;
        let archive_dir = self
            .archive_dir
            .as_deref()
            .map(|dir| outside_root("archive", dir, &root))
            .transpose()?;

        Ok(ValidatedConfig {
            spec: self.clone(),
            root,
            base,
            backup_dir,
            archive_dir,
            compression_level,
        })
    }
}

fn bounded(setting: &'static str, value: Duration) -> Result<(), ValidationError> {
    if value > MAX_LOCK_DURATION {
        return Err(ValidationError::DurationOutOfRange {
            setting,
            secs: value.as_secs(),
            max_secs: MAX_LOCK_DURATION.as_secs(),
        });
    }
    Ok(())
}

fn outside_root(role: &'static str, dir: &Path, root: &Path) -> Result<PathBuf, ValidationError> {
    let absolute = absolute_dir(role, dir)?;
    if is_within(&absolute, root) {
        return Err(ValidationError::NestedDirectory {
            role,
            path: absolute,
            root: root.to_path_buf(),
        });
    }
    Ok(absolute)
}

/// Configuration that passed validation. Cannot be built any other way.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    spec: ConfigSpec,
    root: PathBuf,
    base: PathBuf,
    backup_dir: PathBuf,
    archive_dir: Option<PathBuf>,
    compression_level: u8,
}

impl ValidatedConfig {
    /// Canonical partition root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical allowed base directory.
    pub fn allowed_base(&self) -> &Path {
        &self.base
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn archive_dir(&self) -> Option<&Path> {
        self.archive_dir.as_deref()
    }

    pub fn schema_file(&self) -> Option<&Path> {
        self.spec.schema_file.as_deref()
    }

    pub const fn compression_level(&self) -> u8 {
        self.compression_level
    }

    pub const fn age_threshold_days(&self) -> u32 {
        self.spec.age_threshold_days
    }

    pub const fn retention_days(&self) -> u32 {
        self.spec.retention_days
    }

    pub const fn enable_backup(&self) -> bool {
        self.spec.enable_backup
    }

    pub const fn keep_original_after_compress(&self) -> bool {
        self.spec.keep_original_after_compress
    }

    pub const fn dry_run(&self) -> bool {
        self.spec.dry_run
    }

    pub const fn verbose(&self) -> bool {
        self.spec.verbose
    }

    pub fn codec_program(&self) -> &str {
        &self.spec.codec_program
    }

    pub const fn codec_timeout(&self) -> Duration {
        self.spec.codec_timeout
    }

    pub const fn lock_wait(&self) -> Duration {
        self.spec.lock_wait
    }

    pub const fn lock_ttl(&self) -> Duration {
        self.spec.lock_ttl
    }

    /// The spec this configuration was validated from.
    pub fn spec(&self) -> &ConfigSpec {
        &self.spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let temp = tempfile::tempdir().expect("tempdir");
        let base = temp.path().join("data");
        let root = base.join("ticks");
        std::fs::create_dir_all(&root).expect("root");
        (temp, base, root)
    }

    #[test]
    fn valid_spec_resolves_canonical_paths() {
        let (_temp, base, root) = workspace();
        let config = ConfigSpec::for_root(&root, &base)
            .validate()
            .expect("valid config");

        assert_eq!(config.root(), std::fs::canonicalize(&root).expect("root"));
        assert_eq!(config.compression_level(), 19);
        assert!(config.backup_dir().is_absolute());
        assert!(config.enable_backup());
    }

    #[test]
    fn missing_root_is_configuration_error() {
        let (_temp, base, root) = workspace();
        let spec = ConfigSpec::for_root(root.join("nope"), &base);
        let error = spec.validate().expect_err("missing root");
        assert!(matches!(error, ValidationError::DirectoryNotFound { .. }));
        assert!(!error.is_security());
    }

    #[test]
    fn sibling_prefix_directory_is_not_inside_base() {
        let (_temp, base, _root) = workspace();
        let sibling = base.with_file_name("data2");
        std::fs::create_dir_all(&sibling).expect("sibling");

        let error = ConfigSpec::for_root(&sibling, &base)
            .validate()
            .expect_err("escapes base");
        assert!(error.is_security());
    }

    #[test]
    fn threshold_past_retention_still_validates() {
        let (_temp, base, root) = workspace();
        let mut spec = ConfigSpec::for_root(&root, &base);
        spec.age_threshold_days = 365;
        spec.retention_days = 180;
        let config = spec.validate().expect("rotation needs no retention check");
        assert_eq!(config.age_threshold_days(), 365);
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let (_temp, base, root) = workspace();
        let mut spec = ConfigSpec::for_root(&root, &base);
        spec.age_threshold_days = 0;
        assert!(matches!(
            spec.validate(),
            Err(ValidationError::InvalidAgeThreshold { value: 0 })
        ));
    }

    #[test]
    fn oversized_lock_durations_are_rejected() {
        let (_temp, base, root) = workspace();
        let mut spec = ConfigSpec::for_root(&root, &base);
        spec.lock_ttl = Duration::from_secs(u64::MAX);
        assert!(matches!(
            spec.validate(),
            Err(ValidationError::DurationOutOfRange { setting: "lock ttl", .. })
        ));

        spec.lock_ttl = DEFAULT_LOCK_TTL;
        spec.lock_wait = MAX_LOCK_DURATION + Duration::from_secs(1);
        assert!(matches!(
            spec.validate(),
            Err(ValidationError::DurationOutOfRange { setting: "lock wait", .. })
        ));

        spec.lock_wait = MAX_LOCK_DURATION;
        spec.validate().expect("bound is inclusive");
    }

    #[test]
    fn backup_dir_inside_root_is_rejected() {
        let (_temp, base, root) = workspace();
        let mut spec = ConfigSpec::for_root(&root, &base);
        spec.backup_dir = root.join("backups");
        assert!(matches!(
            spec.validate(),
            Err(ValidationError::NestedDirectory { role: "backup", .. })
        ));
    }

    #[test]
    fn missing_schema_file_is_rejected() {
        let (_temp, base, root) = workspace();
        let mut spec = ConfigSpec::for_root(&root, &base);
        spec.schema_file = Some(base.join("schema.sql"));
        assert!(matches!(
            spec.validate(),
            Err(ValidationError::SchemaFileNotFound { .. })
        ));
    }
}
