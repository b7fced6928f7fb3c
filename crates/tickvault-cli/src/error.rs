use thiserror::Error;
use tickvault_core::{LifecycleError, Severity, ValidationError};

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("{operation}: {failed} of {processed} item(s) failed")]
    BatchFailed {
        operation: &'static str,
        processed: usize,
        failed: usize,
    },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ValidationError> for CliError {
    fn from(error: ValidationError) -> Self {
        Self::Lifecycle(LifecycleError::Validation(error))
    }
}

impl CliError {
    /// Every failure exits 1 so schedulers only need to test for non-zero.
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Lifecycle(_) | Self::BatchFailed { .. } => 1,
            Self::Serialization(_) | Self::Io(_) => 1,
        }
    }

    pub const fn severity(&self) -> Severity {
        match self {
            Self::Lifecycle(error) => error.severity(),
            Self::BatchFailed { .. } | Self::Serialization(_) | Self::Io(_) => Severity::Error,
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Lifecycle(error) => error.kind(),
            Self::BatchFailed { .. } => "BatchFailed",
            Self::Serialization(_) => "SerializationError",
            Self::Io(_) => "IOError",
        }
    }

    /// The line printed to stderr, e.g. `[FATAL] SecurityViolation: filename 'a;b.db' rejected (rule: …)`.
    pub fn report_line(&self) -> String {
        format!("[{}] {}: {self}", self.severity(), self.kind())
    }
}
