use serde::Serialize;
use tickvault_core::{Inventory, PartitionListing};

use crate::error::CliError;

use super::{CommandResult, Context};

#[derive(Debug, Serialize)]
struct ListResponseData {
    today: String,
    count: usize,
    partitions: Vec<PartitionListing>,
}

pub fn run(context: &Context) -> Result<CommandResult, CliError> {
    let inventory = Inventory::new(context.config.clone(), context.engine.clone());
    let partitions = inventory.list(context.today)?;
    CommandResult::ok(
        "list",
        &ListResponseData {
            today: context.today.to_string(),
            count: partitions.len(),
            partitions,
        },
    )
}
