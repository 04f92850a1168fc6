//! Agent wrap-up statistics CLI library.
//!
//! This crate provides the CLI interface for wrap-up aggregation.

mod cli;
pub mod commands;
mod config;

pub use cli::{AgentsAction, AggregateArgs, Cli, Commands, LogAction};
pub use config::Config;
