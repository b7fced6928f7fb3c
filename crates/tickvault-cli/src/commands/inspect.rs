use std::path::Path;

use tickvault_core::Inventory;

use crate::error::CliError;

use super::{CommandResult, Context};

pub fn run(context: &Context, path: &Path) -> Result<CommandResult, CliError> {
    let inventory = Inventory::new(context.config.clone(), context.engine.clone());
    let report = inventory.inspect(path)?;
    CommandResult::ok("inspect", &report)
}
