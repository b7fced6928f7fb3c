use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tickvault_warehouse::WarehouseError;

/// Severity tag printed with every reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Fatal,
    Error,
    Warn,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Fatal => "FATAL",
            Self::Error => "ERROR",
            Self::Warn => "WARN",
        })
    }
}

/// Configuration and security rejections raised before any filesystem mutation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{role} directory '{}' does not resolve to an existing directory", path.display())]
    DirectoryNotFound { role: &'static str, path: PathBuf },

    #[error("{role} directory '{}' cannot be made absolute: {reason}", path.display())]
    Unresolvable {
        role: &'static str,
        path: PathBuf,
        reason: String,
    },

    #[error("{role} directory '{}' must not lie inside the partition root '{}'", path.display(), root.display())]
    NestedDirectory {
        role: &'static str,
        path: PathBuf,
        root: PathBuf,
    },

    #[error("schema file '{}' does not exist", path.display())]
    SchemaFileNotFound { path: PathBuf },

    #[error("compression level '{value}' rejected (rule: decimal integer in {min}..={max})")]
    CompressionLevelNotNumeric { value: String, min: u8, max: u8 },

    #[error("compression level {value} rejected (rule: must lie in {min}..={max})")]
    CompressionLevelOutOfRange { value: u64, min: u8, max: u8 },

    #[error("age threshold must be at least 1 day, got {value}")]
    InvalidAgeThreshold { value: u32 },

    #[error("retention of {retention} days must exceed the compression age threshold of {threshold} days")]
    InvalidRetention { retention: u32, threshold: u32 },

    #[error("codec program must not be empty")]
    EmptyCodecProgram,

    #[error("codec timeout must be greater than zero")]
    ZeroCodecTimeout,

    #[error("{setting} of {secs}s rejected (rule: at most {max_secs}s)")]
    DurationOutOfRange {
        setting: &'static str,
        secs: u64,
        max_secs: u64,
    },

    #[error("date arithmetic around {date} leaves the supported calendar range")]
    DateOutOfRange { date: String },

    #[error("path '{input}' resolves to '{}' which escapes allowed base '{}' (rule: canonical path must be a segment-wise descendant of the base)", resolved.display(), base.display())]
    PathEscapesBase {
        input: String,
        resolved: PathBuf,
        base: PathBuf,
    },

    #[error("filename '{value}' rejected (rule: {rule})")]
    FilenameRejected { value: String, rule: &'static str },
}

impl ValidationError {
    /// Security-class rejections (as opposed to plain configuration errors).
    pub const fn is_security(&self) -> bool {
        matches!(
            self,
            Self::PathEscapesBase { .. } | Self::FilenameRejected { .. }
        )
    }
}

/// Top-level error type for lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("integrity check failed for {}: {detail}", path.display())]
    Integrity { path: PathBuf, detail: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("backup of {} failed: {detail}", path.display())]
    Backup { path: PathBuf, detail: String },

    #[error("compression of {} failed: {detail}", path.display())]
    Compression { path: PathBuf, detail: String },

    #[error("decompression of {} failed: {detail}", path.display())]
    Decompression { path: PathBuf, detail: String },

    #[error("cannot activate today's partition {}: {detail}", path.display())]
    ActivePartition { path: PathBuf, detail: String },

    #[error("lock {} is held by {holder} for '{operation}' until {expires_at}", lock_path.display())]
    LockHeld {
        lock_path: PathBuf,
        holder: String,
        operation: String,
        expires_at: String,
    },

    #[error("storage engine error on {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: WarehouseError,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LifecycleError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn storage(path: impl Into<PathBuf>, source: WarehouseError) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Name of the error class as used in reports.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(error) if error.is_security() => "SecurityViolation",
            Self::Validation(_) => "ConfigurationError",
            Self::Integrity { .. } => "IntegrityError",
            Self::Io { .. } => "IOError",
            Self::Backup { .. } => "BackupError",
            Self::Compression { .. } => "CompressionError",
            Self::Decompression { .. } => "DecompressionError",
            Self::ActivePartition { .. } => "ActivePartitionError",
            Self::LockHeld { .. } => "LockHeldError",
            Self::Storage { .. } => "StorageError",
            Self::Serialization(_) => "SerializationError",
        }
    }

    /// Whether this error aborts the whole invocation.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::ActivePartition { .. } | Self::LockHeld { .. }
        )
    }

    pub const fn severity(&self) -> Severity {
        if self.is_fatal() {
            Severity::Fatal
        } else {
            Severity::Error
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_errors_are_fatal_and_named() {
        let error = LifecycleError::from(ValidationError::FilenameRejected {
            value: String::from("a;b.db"),
            rule: "partition",
        });
        assert!(error.is_fatal());
        assert_eq!(error.kind(), "SecurityViolation");
        assert_eq!(error.severity().to_string(), "FATAL");
        assert!(error.to_string().contains("a;b.db"));
    }

    #[test]
    fn integrity_errors_are_isolated() {
        let error = LifecycleError::Integrity {
            path: PathBuf::from("ticks_2026-10-18.db"),
            detail: String::from("table ticks failed to scan"),
        };
        assert!(!error.is_fatal());
        assert_eq!(error.kind(), "IntegrityError");
        assert_eq!(error.severity(), Severity::Error);
    }

    #[test]
    fn configuration_errors_are_not_security() {
        let error = LifecycleError::from(ValidationError::CompressionLevelNotNumeric {
            value: String::from("5; echo x"),
            min: 1,
            max: 22,
        });
        assert_eq!(error.kind(), "ConfigurationError");
        assert!(error.to_string().contains("5; echo x"));
    }
}
