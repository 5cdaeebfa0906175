//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`run`], [`init`], [`validate`], or [`health`].
//! Each handler lives in its own submodule.

pub mod health;
pub mod init;
pub mod run;
pub mod validate;

use crate::cli::{Cli, Commands};
use crate::error::FanfetchError;

pub async fn dispatch(cli: Cli) -> Result<(), FanfetchError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(*args).await,
        Some(Commands::Init(ref args)) => init::execute(args),
        Some(Commands::Validate(ref args)) => validate::execute(args).await,
        Some(Commands::Health(args)) => health::execute(args).await,
        None => {
            print_welcome();
            Ok(())
        }
    }
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        "\n  fanfetch v{version}: concurrent HTTP fetch aggregator\n\n  \
         No command provided. To get started:\n\n    \
         fanfetch init                     Generate a starter config\n    \
         fanfetch run                      Start the server (auto-detects ./fanfetch.yaml)\n    \
         fanfetch run -c fanfetch.toml     Start with a specific config file\n    \
         fanfetch --help                   See all commands and options\n"
    );
}
