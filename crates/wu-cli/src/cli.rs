//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Agent wrap-up statistics.
///
/// Aggregates the wrap-up time agents spend after calls into fixed-length
/// reporting windows, from the PBX queue log.
#[derive(Debug, Parser)]
#[command(name = "wu", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compute wrap-up time per agent and window.
    Aggregate(AggregateArgs),

    /// Show stored periodic statistics.
    Stats {
        /// Range start (ISO 8601 or relative, e.g. '2 hours ago').
        #[arg(long)]
        start: String,

        /// Range end (ISO 8601 or relative).
        #[arg(long)]
        end: String,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Delete stored periodic statistics for windows after a time.
    Prune {
        /// Keep windows at or before this time (ISO 8601 or relative).
        #[arg(long)]
        after: String,
    },

    /// Read or append queue-log events.
    #[command(subcommand)]
    Log(LogAction),

    /// Manage configured agents.
    #[command(subcommand)]
    Agents(AgentsAction),
}

/// Arguments for `wu aggregate`.
#[derive(Debug, Args)]
pub struct AggregateArgs {
    /// Report start (ISO 8601 or relative, e.g. '2 hours ago').
    #[arg(long)]
    pub start: String,

    /// Report end (ISO 8601 or relative).
    #[arg(long)]
    pub end: String,

    /// Window length (e.g. 30m, 1h, 900s). Defaults to the configured length.
    #[arg(long)]
    pub window: Option<String>,

    /// Fail on the first agent that is not configured.
    #[arg(long)]
    pub strict: bool,

    /// Credit every window a long wrap-up spans, not only the first and last.
    #[arg(long)]
    pub spanning: bool,

    /// Store the result as periodic statistics.
    #[arg(long)]
    pub persist: bool,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Queue-log subcommands.
#[derive(Debug, Subcommand)]
pub enum LogAction {
    /// Append a wrap-up start event.
    Wrapup {
        /// Agent as logged by the PBX (e.g. Agent/1001).
        #[arg(long)]
        agent: String,

        /// Wrap-up length in seconds.
        #[arg(long)]
        duration: i64,

        /// When wrap-up started. Defaults to now.
        #[arg(long)]
        at: Option<String>,

        /// Call identifier. Defaults to a random UUID.
        #[arg(long)]
        call_id: Option<String>,
    },

    /// List queue-log events in a range.
    List {
        /// Range start (ISO 8601 or relative).
        #[arg(long)]
        start: String,

        /// Range end (ISO 8601 or relative). Defaults to now.
        #[arg(long)]
        end: Option<String>,
    },
}

/// Agent subcommands.
#[derive(Debug, Subcommand)]
pub enum AgentsAction {
    /// Add an agent.
    Add {
        /// Agent number, matched against `Agent/<number>` in the log.
        #[arg(long)]
        number: String,

        #[arg(long, default_value = "")]
        firstname: String,

        #[arg(long, default_value = "")]
        lastname: String,

        #[arg(long, default_value = "default")]
        context: String,
    },

    /// List agents.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}
