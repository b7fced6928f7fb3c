//! `rotation_metadata.json`, the record of the last completed rotation.
//!
//! External tooling reads this file, so its key names are fixed:
//!
//! ```json
//! {
//!   "lastRotation": "2026-10-19T00:00:03Z",
//!   "currentDate": "2026-10-19",
//!   "previousDate": "2026-10-18",
//!   "currentDb": "/srv/data/ticks/2026/10/ticks_2026-10-19.db",
//!   "previousDb": "/srv/data/ticks/2026/10/ticks_2026-10-18.db"
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::LifecycleError;
use crate::files::atomic_write_json;

pub const METADATA_FILE_NAME: &str = "rotation_metadata.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationMetadata {
    pub last_rotation: String,
    pub current_date: String,
    pub previous_date: String,
    pub current_db: String,
    pub previous_db: String,
}

/// Reads and atomically replaces the metadata file under a partition root.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join(METADATA_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no rotation has completed yet.
    pub fn load(&self) -> Result<Option<RotationMetadata>, LifecycleError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(LifecycleError::io(&self.path, error)),
        }
    }

    pub fn write(&self, metadata: &RotationMetadata) -> Result<(), LifecycleError> {
        atomic_write_json(&self.path, metadata)
    }
}

/// Current UTC time as RFC 3339.
pub(crate) fn now_rfc3339() -> String {
    format_rfc3339(OffsetDateTime::now_utc())
}

pub(crate) fn format_rfc3339(instant: OffsetDateTime) -> String {
    instant
        .format(&Rfc3339)
        .unwrap_or_else(|_| instant.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RotationMetadata {
        RotationMetadata {
            last_rotation: String::from("2026-10-19T00:00:03Z"),
            current_date: String::from("2026-10-19"),
            previous_date: String::from("2026-10-18"),
            current_db: String::from("/srv/ticks/2026/10/ticks_2026-10-19.db"),
            previous_db: String::from("/srv/ticks/2026/10/ticks_2026-10-18.db"),
        }
    }

    #[test]
    fn writes_fixed_key_names() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = MetadataStore::new(temp.path());
        store.write(&sample()).expect("write");

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).expect("read")).expect("json");
        let mut keys: Vec<&str> = raw
            .as_object()
            .expect("object")
            .keys()
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            ["currentDate", "currentDb", "lastRotation", "previousDate", "previousDb"]
        );
        assert_eq!(store.load().expect("load"), Some(sample()));
    }

    #[test]
    fn missing_file_loads_as_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert_eq!(MetadataStore::new(temp.path()).load().expect("load"), None);
    }
}
