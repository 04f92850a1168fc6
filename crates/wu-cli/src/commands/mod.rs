//! CLI subcommand implementations.

pub mod agents;
pub mod aggregate;
pub mod log;
pub mod stats;
pub mod util;
