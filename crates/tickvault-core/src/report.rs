//! Per-item outcomes and batch summaries.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{error, info};

use crate::error::{LifecycleError, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub action: &'static str,
    pub path: PathBuf,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

/// Counts plus the item list for one batch operation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub items: Vec<ItemReport>,
}

impl BatchSummary {
    pub fn succeed(&mut self, action: &'static str, path: &Path, detail: Option<String>) {
        self.succeeded += 1;
        self.push(action, path, Outcome::Succeeded, detail, None);
    }

    pub fn skip(&mut self, action: &'static str, path: &Path, reason: impl Into<String>) {
        self.skipped += 1;
        self.push(action, path, Outcome::Skipped, Some(reason.into()), None);
    }

    /// Record and log a failure. The batch carries on.
    pub fn fail(&mut self, action: &'static str, path: &Path, failure: &LifecycleError) {
        self.failed += 1;
        error!(
            action,
            path = %path.display(),
            kind = failure.kind(),
            severity = %failure.severity(),
            error = %failure,
            "step failed"
        );
        self.push(action, path, Outcome::Failed, Some(failure.to_string()), Some(failure));
    }

    pub const fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// One-line summary printed at the end of every invocation.
    pub fn summary_line(&self, operation: &str) -> String {
        format!(
            "{operation}: total={} succeeded={} skipped={} failed={}",
            self.processed, self.succeeded, self.skipped, self.failed
        )
    }

    pub fn log_summary(&self, operation: &str) {
        info!(
            processed = self.processed,
            succeeded = self.succeeded,
            skipped = self.skipped,
            failed = self.failed,
            "{operation} finished"
        );
    }

    fn push(
        &mut self,
        action: &'static str,
        path: &Path,
        outcome: Outcome,
        detail: Option<String>,
        failure: Option<&LifecycleError>,
    ) {
        self.processed += 1;
        self.items.push(ItemReport {
            action,
            path: path.to_path_buf(),
            outcome,
            detail,
            error_kind: failure.map(LifecycleError::kind),
            severity: failure.map(LifecycleError::severity),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_each_outcome() {
        let mut summary = BatchSummary::default();
        summary.succeed("compress", Path::new("a.db"), None);
        summary.skip("compress", Path::new("b.db"), "too recent");
        summary.fail(
            "compress",
            Path::new("c.db"),
            &LifecycleError::Compression {
                path: PathBuf::from("c.db"),
                detail: String::from("zstd exited with 1"),
            },
        );

        assert_eq!(summary.processed, 3);
        assert!(summary.has_failures());
        assert_eq!(
            summary.summary_line("compress"),
            "compress: total=3 succeeded=1 skipped=1 failed=1"
        );
        assert_eq!(summary.items[2].error_kind, Some("CompressionError"));
    }
}
