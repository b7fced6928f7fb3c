use tickvault_core::Inventory;

use crate::error::CliError;

use super::{CommandResult, Context};

pub fn run(context: &Context) -> Result<CommandResult, CliError> {
    let inventory = Inventory::new(context.config.clone(), context.engine.clone());
    let report = inventory.status(context.today)?;
    CommandResult::ok("status", &report)
}
