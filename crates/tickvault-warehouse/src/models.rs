use serde::{Deserialize, Serialize};

/// A single top-of-book tick as stored in a partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    pub symbol: String,
    pub timestamp_ms: i64,
    pub bid: f64,
    pub ask: f64,
    pub spread: f64,
    pub volume: i64,
    pub lp_source: Option<String>,
    pub flags: i32,
}

impl TickRecord {
    /// Build a tick with the spread derived from bid/ask.
    pub fn quote(symbol: impl Into<String>, timestamp_ms: i64, bid: f64, ask: f64) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp_ms,
            bid,
            ask,
            spread: ask - bid,
            volume: 0,
            lp_source: None,
            flags: 0,
        }
    }
}

/// Outcome of a partition consistency check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// True iff the file opened, every table scanned and no tick invariant is violated.
    pub ok: bool,
    pub table_count: usize,
    pub tick_count: i64,
    pub symbol_count: i64,
    pub first_tick_ms: Option<i64>,
    pub last_tick_ms: Option<i64>,
    /// Ticks violating `ask >= bid` or the spread tolerance.
    pub invariant_violations: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub(crate) fn failed(issue: impl Into<String>) -> Self {
        Self {
            ok: false,
            issues: vec![issue.into()],
            ..Self::default()
        }
    }

    /// First recorded issue, or a generic description.
    pub fn summary(&self) -> String {
        if self.ok {
            return String::from("ok");
        }
        self.issues
            .first()
            .cloned()
            .unwrap_or_else(|| String::from("consistency check failed"))
    }
}
