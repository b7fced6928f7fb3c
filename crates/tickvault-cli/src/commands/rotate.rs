use tickvault_core::RotationController;

use crate::error::CliError;

use super::{CommandResult, Context};

/// Per-partition failures on yesterday are reported but do not fail the run;
/// only a fatal error (today's partition, the lease) does.
pub fn run(context: &Context) -> Result<CommandResult, CliError> {
    let controller = RotationController::new(context.config.clone(), context.engine.clone());
    let report = controller.rotate(context.today)?;
    CommandResult::batch("rotate", &report, &report.summary, false)
}
