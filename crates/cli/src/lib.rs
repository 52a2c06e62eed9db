// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! gqlsync-cli: operator commands for the gqlsync client.
//!
//! - `subscribe`: open a realtime subscription and print its events
//! - `pending`: list mutations waiting in the offline queue
//! - `last-sync`: show the persisted last sync time of a delta-sync target

mod cli;
mod commands;
pub mod error;

pub use cli::{Cli, Command, OutputFormat, SyncTargetArgs};
pub use error::{Error, Result};

/// Install the stderr log subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Execute a parsed command line.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Subscribe {
            query,
            variables,
            token,
        } => commands::subscribe::run(&cli.config, query, variables.as_deref(), token),
        Command::Pending { output } => commands::pending::run(&cli.config, output),
        Command::LastSync(target) => commands::last_sync::run(&cli.config, &target),
    }
}
