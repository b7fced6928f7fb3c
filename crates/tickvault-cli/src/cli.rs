//! CLI argument definitions for tickvault.
//!
//! Every setting is a global flag with an environment-variable fallback, so
//! the same binary can be driven by a scheduler through the environment or
//! by an operator through flags.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rotate` | Close yesterday, activate today, pre-create tomorrow (default) |
//! | `status` | Rotation metadata, lease holder and partition counts |
//! | `compress` | Compress partitions older than the age threshold |
//! | `decompress` | Restore one `.db.zst` file next to itself |
//! | `purge` | Archive or delete partitions past the retention horizon |
//! | `list` | Every partition with its state and tier |
//! | `inspect` | Consistency check and tick statistics for one partition |
//!
//! # Examples
//!
//! ```bash
//! # Nightly rotation driven by the environment
//! DB_DIR=/srv/data/ticks ALLOWED_BASE_DIR=/srv/data tickvault
//!
//! # Preview a compression run
//! tickvault --dry-run compress --format table
//!
//! # Keep a year of history and move older partitions aside
//! tickvault purge --retention-days 365 --archive-dir /mnt/cold/ticks
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tickvault_core::config::{
    DEFAULT_AGE_THRESHOLD_DAYS, DEFAULT_ALLOWED_BASE_DIR, DEFAULT_BACKUP_DIR,
    DEFAULT_CODEC_PROGRAM, DEFAULT_COMPRESSION_LEVEL, DEFAULT_RETENTION_DAYS, DEFAULT_ROOT_DIR,
};
use tickvault_core::{ConfigSpec, LogFormat};

/// Lifecycle manager for daily tick partitions.
#[derive(Debug, Parser)]
#[command(
    name = "tickvault",
    author,
    version,
    about = "Rotate, compress and expire daily tick partitions",
    long_about = "tickvault keeps one DuckDB partition per calendar day under \
<root>/YYYY/MM/ticks_YYYY-MM-DD.db and moves it through its lifecycle:\n\
\n\
  • rotate: close and back up yesterday, activate today, pre-create tomorrow\n\
  • compress: zstd partitions older than the age threshold\n\
  • purge: archive or delete partitions past the retention horizon\n\
\n\
Without a subcommand tickvault rotates."
)]
pub struct Cli {
    /// Output format for reports.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Format of log lines written to stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Text)]
    pub log_format: LogFormatArg,

    /// Partition root.
    #[arg(long, global = true, env = "DB_DIR", default_value = DEFAULT_ROOT_DIR)]
    pub root_dir: PathBuf,

    /// Directory the partition root must live under.
    #[arg(long, global = true, env = "ALLOWED_BASE_DIR", default_value = DEFAULT_ALLOWED_BASE_DIR)]
    pub allowed_base_dir: PathBuf,

    /// SQL applied to new partitions instead of the built-in schema.
    #[arg(long, global = true, env = "SCHEMA_FILE")]
    pub schema_file: Option<PathBuf>,

    /// Where closed partitions are copied during rotation.
    #[arg(long, global = true, env = "BACKUP_DIR", default_value = DEFAULT_BACKUP_DIR)]
    pub backup_dir: PathBuf,

    /// Copy yesterday's partition to the backup directory (`--enable-backup=false` to skip).
    #[arg(long, global = true, env = "ENABLE_BACKUP", default_value = "true", action = ArgAction::Set,
          num_args = 0..=1, require_equals = true, default_missing_value = "true",
          value_parser = BoolishValueParser::new())]
    pub enable_backup: bool,

    /// Log at info level instead of warn.
    #[arg(long, global = true, env = "VERBOSE", default_value = "true", action = ArgAction::Set,
          num_args = 0..=1, require_equals = true, default_missing_value = "true",
          value_parser = BoolishValueParser::new())]
    pub verbose: bool,

    /// Report what would happen without touching the filesystem.
    #[arg(long, global = true, env = "DRY_RUN", default_value = "false", action = ArgAction::Set,
          num_args = 0..=1, require_equals = true, default_missing_value = "true",
          value_parser = BoolishValueParser::new())]
    pub dry_run: bool,

    /// Partitions at least this many days older than the cutoff are compressed.
    #[arg(long, global = true, env = "DAYS_BEFORE_COMPRESS", default_value_t = DEFAULT_AGE_THRESHOLD_DAYS)]
    pub age_threshold_days: u32,

    /// zstd level, 1 to 22. Kept as text so rejected input is echoed verbatim.
    #[arg(long, global = true, env = "COMPRESSION_LEVEL", default_value = DEFAULT_COMPRESSION_LEVEL)]
    pub compression_level: String,

    /// Keep the `.db` file after a verified compression.
    #[arg(long, global = true, env = "KEEP_ORIGINAL", default_value = "false", action = ArgAction::Set,
          num_args = 0..=1, require_equals = true, default_missing_value = "true",
          value_parser = BoolishValueParser::new())]
    pub keep_original: bool,

    /// Partitions older than this many days are purged.
    #[arg(long, global = true, env = "RETENTION_DAYS", default_value_t = DEFAULT_RETENTION_DAYS)]
    pub retention_days: u32,

    /// Move purged partitions here instead of deleting them.
    #[arg(long, global = true, env = "ARCHIVE_DIR")]
    pub archive_dir: Option<PathBuf>,

    /// zstd executable.
    #[arg(long, global = true, env = "ZSTD_BIN", default_value = DEFAULT_CODEC_PROGRAM)]
    pub codec_program: String,

    /// Kill a codec process running longer than this.
    #[arg(long, global = true, env = "CODEC_TIMEOUT_SECS", default_value_t = 3600)]
    pub codec_timeout_secs: u64,

    /// How long to wait for another invocation's lease.
    #[arg(long, global = true, env = "LOCK_WAIT_SECS", default_value_t = 30)]
    pub lock_wait_secs: u64,

    /// Lease lifetime; an older lease is taken over.
    #[arg(long, global = true, env = "LOCK_TTL_SECS", default_value_t = 7200)]
    pub lock_ttl_secs: u64,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// The subcommand to run; rotation when none was given.
    pub fn subcommand(&self) -> Command {
        self.command.clone().unwrap_or(Command::Rotate)
    }

    /// Raw configuration assembled from flags and environment. Not yet validated.
    pub fn config_spec(&self) -> ConfigSpec {
        ConfigSpec {
            root_dir: self.root_dir.clone(),
            allowed_base_dir: self.allowed_base_dir.clone(),
            schema_file: self.schema_file.clone(),
            backup_dir: self.backup_dir.clone(),
            archive_dir: self.archive_dir.clone(),
            enable_backup: self.enable_backup,
            verbose: self.verbose,
            dry_run: self.dry_run,
            age_threshold_days: self.age_threshold_days,
            compression_level: self.compression_level.clone(),
            keep_original_after_compress: self.keep_original,
            retention_days: self.retention_days,
            codec_program: self.codec_program.clone(),
            codec_timeout: Duration::from_secs(self.codec_timeout_secs),
            lock_wait: Duration::from_secs(self.lock_wait_secs),
            lock_ttl: Duration::from_secs(self.lock_ttl_secs),
        }
    }
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Single JSON object.
    Json,
    /// Aligned text for terminals.
    Table,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}

/// Available CLI commands.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the day-boundary rotation.
    ///
    /// Checkpoints, verifies and backs up yesterday's partition, makes sure
    /// today's exists, writes rotation_metadata.json and pre-creates
    /// tomorrow's partition. Only a failure to activate today is fatal.
    Rotate,

    /// Show rotation metadata, the current lease and partition counts.
    Status,

    /// Compress partitions strictly older than today minus the age threshold.
    ///
    /// Each partition is checked for integrity first; failures are reported
    /// per file and the batch carries on.
    Compress,

    /// Restore a compressed partition next to its `.db.zst` file.
    Decompress {
        /// A `ticks_YYYY-MM-DD.db.zst` file under the partition root.
        path: PathBuf,
    },

    /// Archive or delete partitions older than the retention horizon.
    Purge,

    /// List every partition with its state, tier and size.
    List,

    /// Run the consistency check on one partition and print its statistics.
    Inspect {
        /// A `ticks_YYYY-MM-DD.db` file under the partition root.
        path: PathBuf,
    },
}

impl Command {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Rotate => "rotate",
            Self::Status => "status",
            Self::Compress => "compress",
            Self::Decompress { .. } => "decompress",
            Self::Purge => "purge",
            Self::List => "list",
            Self::Inspect { .. } => "inspect",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tickvault").chain(args.iter().copied()))
            .expect("arguments parse")
    }

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn missing_subcommand_means_rotate() {
        let cli = parse(&["--root-dir", "/srv/data/ticks"]);
        assert_eq!(cli.subcommand(), Command::Rotate);
    }

    #[test]
    fn global_flags_are_accepted_after_the_subcommand() {
        let cli = parse(&["compress", "--dry-run", "--compression-level", "3", "--format", "table"]);

        assert_eq!(cli.subcommand(), Command::Compress);
        assert!(cli.dry_run);
        assert_eq!(cli.format, OutputFormat::Table);
        assert_eq!(cli.config_spec().compression_level, "3");
    }

    #[test]
    fn boolean_settings_take_explicit_values() {
        let cli = parse(&["--enable-backup=false", "--keep-original", "rotate"]);

        let spec = cli.config_spec();
        assert!(!spec.enable_backup);
        assert!(spec.keep_original_after_compress);
        assert_eq!(cli.subcommand(), Command::Rotate);
    }

    #[test]
    fn compression_level_is_passed_through_unparsed() {
        let cli = parse(&["--compression-level", "5; echo x", "compress"]);
        assert_eq!(cli.config_spec().compression_level, "5; echo x");
    }

    #[test]
    fn decompress_takes_a_path() {
        let cli = parse(&["decompress", "data/ticks/2026/09/ticks_2026-09-01.db.zst"]);
        match cli.subcommand() {
            Command::Decompress { path } => {
                assert!(path.ends_with("ticks_2026-09-01.db.zst"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn durations_are_converted_from_seconds() {
        let cli = parse(&["--codec-timeout-secs", "90", "--lock-wait-secs", "0", "status"]);
        let spec = cli.config_spec();
        assert_eq!(spec.codec_timeout, Duration::from_secs(90));
        assert!(spec.lock_wait.is_zero());
    }
}
