mod compress;
mod decompress;
mod inspect;
mod list;
mod purge;
mod rotate;
mod status;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tickvault_core::{BatchSummary, ValidatedConfig};
use tickvault_warehouse::{DuckDbEngine, SchemaSource, StorageEngine};
use time::{Date, OffsetDateTime};
use tracing::info;
use uuid::Uuid;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// What a command hands back for rendering.
pub struct CommandResult {
    pub operation: &'static str,
    pub data: Value,
    /// `total=… succeeded=… skipped=… failed=…` for batch commands.
    pub summary_line: Option<String>,
    /// Set when per-item failures must turn into a non-zero exit.
    pub failure: Option<CliError>,
}

impl CommandResult {
    pub fn ok(operation: &'static str, data: &impl Serialize) -> Result<Self, CliError> {
        Ok(Self {
            operation,
            data: serde_json::to_value(data)?,
            summary_line: None,
            failure: None,
        })
    }

    /// A batch report. Failed items only fail the invocation when `strict`.
    pub fn batch(
        operation: &'static str,
        data: &impl Serialize,
        summary: &BatchSummary,
        strict: bool,
    ) -> Result<Self, CliError> {
        let failure = (strict && summary.has_failures()).then(|| CliError::BatchFailed {
            operation,
            processed: summary.processed,
            failed: summary.failed,
        });
        Ok(Self {
            operation,
            data: serde_json::to_value(data)?,
            summary_line: Some(summary.summary_line(operation)),
            failure,
        })
    }
}

/// Shared by every command: the validated configuration, the storage engine
/// built from it, and the calendar day the invocation acts on.
pub struct Context {
    pub config: ValidatedConfig,
    pub engine: Arc<dyn StorageEngine>,
    pub today: Date,
}

impl Context {
    fn new(config: ValidatedConfig) -> Self {
        let schema = config
            .schema_file()
            .map_or(SchemaSource::BuiltIn, |path| SchemaSource::File(path.to_path_buf()));
        Self {
            engine: Arc::new(DuckDbEngine::new(schema)),
            today: OffsetDateTime::now_utc().date(),
            config,
        }
    }
}

pub fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    let command = cli.subcommand();
    let config = cli.config_spec().validate()?;
    let context = Context::new(config);

    let invocation = Uuid::new_v4();
    let span = tracing::info_span!("invocation", id = %invocation, command = command.name());
    let _entered = span.enter();
    info!(
        root = %context.config.root().display(),
        today = %context.today,
        dry_run = context.config.dry_run(),
        "starting"
    );

    match &command {
        Command::Rotate => rotate::run(&context),
        Command::Status => status::run(&context),
        Command::Compress => compress::run(&context),
        Command::Decompress { path } => decompress::run(&context, path),
        Command::Purge => purge::run(&context),
        Command::List => list::run(&context),
        Command::Inspect { path } => inspect::run(&context, path),
    }
}
