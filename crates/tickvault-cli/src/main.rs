mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use std::process::ExitCode;
use tickvault_core::init_logging;

use crate::cli::Cli;
use crate::error::CliError;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{}", error.report_line());
            ExitCode::from(error.exit_code())
        }
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format.into());

    let result = commands::run(&cli)?;
    output::render(&result, cli.format, cli.pretty)?;

    match result.failure {
        Some(failure) => Err(failure),
        None => Ok(()),
    }
}
