//! Partition naming: `<root>/YYYY/MM/ticks_YYYY-MM-DD.db`.

use std::path::{Path, PathBuf};

use time::macros::format_description;
use time::Date;

pub const PARTITION_PREFIX: &str = "ticks_";
pub const PARTITION_SUFFIX: &str = ".db";
pub const COMPRESSED_SUFFIX: &str = ".zst";
pub const STAGING_SUFFIX: &str = ".partial";

/// Calendar key used in file names, metadata and the ledger.
#[must_use]
pub fn date_key(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

pub fn parse_date_key(key: &str) -> Option<Date> {
    Date::parse(key, format_description!("[year]-[month]-[day]")).ok()
}

#[must_use]
pub fn partition_file_name(date: Date) -> String {
    format!("{PARTITION_PREFIX}{}{PARTITION_SUFFIX}", date_key(date))
}

/// Month directory relative to the root, e.g. `2026/10`.
#[must_use]
pub fn month_dir(date: Date) -> PathBuf {
    PathBuf::from(format!("{:04}", date.year())).join(format!("{:02}", u8::from(date.month())))
}

#[must_use]
pub fn relative_path(date: Date) -> PathBuf {
    month_dir(date).join(partition_file_name(date))
}

#[must_use]
pub fn partition_path(root: &Path, date: Date) -> PathBuf {
    root.join(relative_path(date))
}

/// Sibling path with `suffix` appended to the full file name.
#[must_use]
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

#[must_use]
pub fn compressed_path(path: &Path) -> PathBuf {
    with_suffix(path, COMPRESSED_SUFFIX)
}

#[must_use]
pub fn staging_path(path: &Path) -> PathBuf {
    with_suffix(path, STAGING_SUFFIX)
}

/// Date encoded in `ticks_YYYY-MM-DD.db` or `ticks_YYYY-MM-DD.db.zst`.
pub fn parse_partition_date(file_name: &str) -> Option<Date> {
    let stem = file_name
        .strip_suffix(COMPRESSED_SUFFIX)
        .unwrap_or(file_name)
        .strip_suffix(PARTITION_SUFFIX)?
        .strip_prefix(PARTITION_PREFIX)?;
    parse_date_key(stem)
}

/// Whether a basename looks like an uncompressed partition candidate.
pub fn is_partition_candidate(file_name: &str) -> bool {
    file_name.ends_with(PARTITION_SUFFIX)
}

/// Whether a basename looks like a compressed partition candidate.
pub fn is_compressed_candidate(file_name: &str) -> bool {
    file_name.ends_with(".db.zst")
}

/// `YYYY-MM-DD` date serialization for serde fields.
pub mod serde_date {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};
    use time::Date;

    pub fn serialize<S: Serializer>(date: &Date, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::date_key(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Date, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_date_key(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid partition date '{raw}'")))
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    #[test]
    fn builds_month_partitioned_paths() {
        let path = partition_path(Path::new("/data/ticks"), date!(2026 - 01 - 05));
        assert_eq!(
            path,
            PathBuf::from("/data/ticks/2026/01/ticks_2026-01-05.db")
        );
        assert_eq!(
            compressed_path(&path),
            PathBuf::from("/data/ticks/2026/01/ticks_2026-01-05.db.zst")
        );
    }

    #[test]
    fn parses_dates_from_both_forms() {
        assert_eq!(
            parse_partition_date("ticks_2026-10-19.db"),
            Some(date!(2026 - 10 - 19))
        );
        assert_eq!(
            parse_partition_date("ticks_2026-10-19.db.zst"),
            Some(date!(2026 - 10 - 19))
        );
        assert_eq!(parse_partition_date("ticks_2026-02-30.db"), None);
        assert_eq!(parse_partition_date("other_2026-10-19.db"), None);
        assert_eq!(parse_partition_date("ticks_2026-10-19.db.wal"), None);
    }

    #[test]
    fn date_key_round_trips() {
        let day = date!(2024 - 02 - 29);
        assert_eq!(date_key(day), "2024-02-29");
        assert_eq!(parse_date_key("2024-02-29"), Some(day));
    }
}
