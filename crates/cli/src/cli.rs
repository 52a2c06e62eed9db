// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Parse a string that must not be empty or whitespace-only.
fn non_empty_string(s: &str) -> Result<String, String> {
    if s.trim().is_empty() {
        Err("cannot be empty".to_string())
    } else {
        Ok(s.to_string())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "gqlsync")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect and exercise an offline-capable GraphQL client")]
pub struct Cli {
    /// Client configuration file
    #[arg(long, short = 'c', global = true, value_name = "path", default_value = "gqlsync.toml")]
    pub config: PathBuf,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Subscribe and print events until interrupted
    #[command(after_help = "\
Examples:
  gqlsync subscribe 'subscription { onCreatePost { id title } }'
  gqlsync subscribe 'subscription OnPost($id: ID!) { onPost(id: $id) { id } }' --variables '{\"id\":\"1\"}'
  gqlsync subscribe '...' --token \"$ID_TOKEN\"     Token for user pools, OIDC or Lambda auth")]
    Subscribe {
        /// Subscription document
        #[arg(value_parser = non_empty_string)]
        query: String,

        /// Variables as a JSON object
        #[arg(long)]
        variables: Option<String>,

        /// Bearer token for token-based auth types
        #[arg(long, env = "GQLSYNC_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// List mutations waiting in the offline queue
    Pending {
        #[arg(long, short, value_enum, default_value_t)]
        output: OutputFormat,
    },

    /// Show when a delta-sync target last synced
    #[command(name = "last-sync")]
    #[command(after_help = "\
Examples:
  gqlsync last-sync 3q2+7w==                        Look up a known operation hash
  gqlsync last-sync --base-query 'query { listPosts { id } }' \\
                    --subscription 'subscription { onPost { id } }'")]
    LastSync(SyncTargetArgs),
}

/// A delta-sync target, given by hash or by its operations.
#[derive(Args, Debug, Default, Clone)]
pub struct SyncTargetArgs {
    /// Operation hash
    #[arg(required_unless_present = "base_query", conflicts_with = "base_query")]
    pub hash: Option<String>,

    /// Base query document
    #[arg(long)]
    pub base_query: Option<String>,

    /// Delta query document
    #[arg(long, requires = "base_query")]
    pub delta_query: Option<String>,

    /// Subscription document
    #[arg(long, requires = "base_query")]
    pub subscription: Option<String>,

    /// Variables, as a JSON object, shared by the operations
    #[arg(long, requires = "base_query")]
    pub variables: Option<String>,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
