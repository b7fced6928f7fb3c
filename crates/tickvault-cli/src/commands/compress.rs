use std::sync::Arc;

use tickvault_core::{CompressionController, ZstdCli};

use crate::error::CliError;

use super::{CommandResult, Context};

pub fn run(context: &Context) -> Result<CommandResult, CliError> {
    let codec = Arc::new(ZstdCli::from_config(&context.config));
    let controller =
        CompressionController::new(context.config.clone(), context.engine.clone(), codec);
    let report = controller.compress(context.today)?;
    CommandResult::batch("compress", &report, &report.summary, true)
}
