//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`run`] or [`validate`]. Each handler lives in its
//! own submodule.

pub mod run;
pub mod validate;

use crate::cli::{Cli, Commands};
use crate::error::RouterError;

pub async fn dispatch(cli: Cli) -> Result<(), RouterError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(*args).await,
        Some(Commands::Validate(ref args)) => validate::execute(args),
        None => {
            print_welcome();
            Ok(())
        }
    }
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        "\n  relay-router v{version}: content-based NATS message router\n\n  \
         No command provided. To get started:\n\n    \
         relay-router validate destinations.json      Check a destination list\n    \
         relay-router run                             Start routing (reads SRC_* / DST_FILE_LOC)\n    \
         relay-router --help                          See all commands and options\n"
    );
}
