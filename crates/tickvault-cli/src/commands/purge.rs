use tickvault_core::RetentionController;

use crate::error::CliError;

use super::{CommandResult, Context};

pub fn run(context: &Context) -> Result<CommandResult, CliError> {
    let controller = RetentionController::new(context.config.clone());
    let report = controller.purge(context.today)?;
    CommandResult::batch("purge", &report, &report.summary, true)
}
