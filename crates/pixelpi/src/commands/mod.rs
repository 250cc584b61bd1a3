//! Command dispatch: bridges CLI args -> engine operations -> output formatting.

pub mod adapters;
pub mod ap;
pub mod check;
pub mod completions;
pub mod config_cmd;
pub mod reservations;
pub mod run;
pub mod scan;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a host-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Adapters(args) => adapters::handle(args, global).await,
        Command::Ap(args) => ap::handle(args, global).await,
        Command::Scan(args) => scan::handle(args, global).await,
        Command::Reservations(args) => reservations::handle(args, global).await,
        Command::Check => check::handle(global).await,
        // Handled before dispatch
        Command::Run(_) | Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "command must be handled before dispatch".into(),
        )),
    }
}
