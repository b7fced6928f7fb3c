//! Path containment and filename allowlisting.
//!
//! Every destructive or subprocess-invoking operation validates the
//! filename it is about to act on before touching the filesystem.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationError;

pub const MIN_COMPRESSION_LEVEL: u8 = 1;
pub const MAX_COMPRESSION_LEVEL: u8 = 22;

pub const PARTITION_NAME_RULE: &str = r"^[A-Za-z0-9_.-]+\.db$";
pub const COMPRESSED_NAME_RULE: &str = r"^[A-Za-z0-9_.-]+\.db\.zst$";

static PARTITION_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(PARTITION_NAME_RULE).expect("partition filename pattern is a valid regex")
});

static COMPRESSED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(COMPRESSED_NAME_RULE).expect("compressed filename pattern is a valid regex")
});

/// Resolve a directory to its canonical form, requiring that it exists.
pub fn canonical_dir(role: &'static str, path: &Path) -> Result<PathBuf, ValidationError> {
    let not_found = || ValidationError::DirectoryNotFound {
        role,
        path: path.to_path_buf(),
    };
    let canonical = std::fs::canonicalize(path).map_err(|_| not_found())?;
    if !canonical.is_dir() {
        return Err(not_found());
    }
    Ok(canonical)
}

/// Absolute form of a directory that may not exist yet.
///
/// Existing directories are canonicalized so symlinks cannot hide nesting.
pub fn absolute_dir(role: &'static str, path: &Path) -> Result<PathBuf, ValidationError> {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return Ok(canonical);
    }
    std::path::absolute(path).map_err(|error| ValidationError::Unresolvable {
        role,
        path: path.to_path_buf(),
        reason: error.to_string(),
    })
}

/// Segment-wise ancestor test: `/data/ticks2` is not within `/data/ticks`.
///
/// Both paths must already be canonical.
#[must_use]
pub fn is_within(candidate: &Path, base: &Path) -> bool {
    candidate.starts_with(base)
}

/// Canonicalize `path` and require that it lies within `base`.
///
/// `base` must already be canonical.
pub fn ensure_within(path: &Path, base: &Path) -> Result<PathBuf, ValidationError> {
    let resolved = std::fs::canonicalize(path).map_err(|_| ValidationError::DirectoryNotFound {
        role: "target",
        path: path.to_path_buf(),
    })?;
    if !is_within(&resolved, base) {
        return Err(ValidationError::PathEscapesBase {
            input: path.display().to_string(),
            resolved,
            base: base.to_path_buf(),
        });
    }
    Ok(resolved)
}

/// Parse a raw compression level. Only plain decimal digits are accepted.
pub fn parse_compression_level(raw: &str) -> Result<u8, ValidationError> {
    let not_numeric = || ValidationError::CompressionLevelNotNumeric {
        value: raw.to_string(),
        min: MIN_COMPRESSION_LEVEL,
        max: MAX_COMPRESSION_LEVEL,
    };
    if raw.is_empty() || !raw.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(not_numeric());
    }
    let value: u64 = raw.parse().map_err(|_| not_numeric())?;
    check_compression_level(value)
}

/// Range check for an already numeric compression level.
pub fn check_compression_level(value: u64) -> Result<u8, ValidationError> {
    match u8::try_from(value) {
        Ok(level) if (MIN_COMPRESSION_LEVEL..=MAX_COMPRESSION_LEVEL).contains(&level) => Ok(level),
        _ => Err(ValidationError::CompressionLevelOutOfRange {
            value,
            min: MIN_COMPRESSION_LEVEL,
            max: MAX_COMPRESSION_LEVEL,
        }),
    }
}

/// Allowlist checks for partition file basenames.
pub struct FilenameValidator;

impl FilenameValidator {
    /// Accept `name` only if it matches `^[A-Za-z0-9_.-]+\.db$`.
    pub fn partition_name(name: &OsStr) -> Result<&str, ValidationError> {
        check(name, &PARTITION_NAME, PARTITION_NAME_RULE)
    }

    /// Accept `name` only if it matches `^[A-Za-z0-9_.-]+\.db\.zst$`.
    pub fn compressed_name(name: &OsStr) -> Result<&str, ValidationError> {
        check(name, &COMPRESSED_NAME, COMPRESSED_NAME_RULE)
    }

    /// Validate a compressed name and the decompressed name derived from it.
    pub fn decompression_pair(name: &OsStr) -> Result<(String, String), ValidationError> {
        let compressed = Self::compressed_name(name)?;
        let decompressed = compressed
            .strip_suffix(".zst")
            .unwrap_or(compressed)
            .to_string();
        Self::partition_name(OsStr::new(&decompressed))?;
        Ok((compressed.to_string(), decompressed))
    }

    /// Validate the basename of a partition path.
    pub fn partition_file(path: &Path) -> Result<&str, ValidationError> {
        Self::partition_name(basename(path, PARTITION_NAME_RULE)?)
    }

    /// Validate the basename of a compressed partition path.
    pub fn compressed_file(path: &Path) -> Result<&str, ValidationError> {
        Self::compressed_name(basename(path, COMPRESSED_NAME_RULE)?)
    }

    /// Validate either form, whichever the basename claims to be.
    pub fn any_partition_file(path: &Path) -> Result<&str, ValidationError> {
        let name = basename(path, PARTITION_NAME_RULE)?;
        if name.to_string_lossy().ends_with(".zst") {
            Self::compressed_name(name)
        } else {
            Self::partition_name(name)
        }
    }
}

fn basename<'a>(path: &'a Path, rule: &'static str) -> Result<&'a OsStr, ValidationError> {
    path.file_name()
        .ok_or_else(|| ValidationError::FilenameRejected {
            value: path.display().to_string(),
            rule,
        })
}

fn check<'a>(
    name: &'a OsStr,
    pattern: &Regex,
    rule: &'static str,
) -> Result<&'a str, ValidationError> {
    match name.to_str() {
        Some(text) if pattern.is_match(text) => Ok(text),
        _ => Err(ValidationError::FilenameRejected {
            value: name.to_string_lossy().into_owned(),
            rule,
        }),
    }
}
