//! Error types for the aggregation core.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that abort an aggregation run.
#[derive(Debug, Error)]
pub enum StatsError {
    /// The reporting range or window length cannot produce windows.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An agent name in the log has no configured agent.
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    /// The event log could not be read.
    #[error("failed to read event log")]
    UpstreamRead(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StatsError {
    /// Wraps a reader failure.
    pub fn upstream(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::UpstreamRead(Box::new(err))
    }
}

/// A single event-log row that could not be turned into a wrap-up event.
///
/// These never abort a run: the row is skipped and counted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DataQualityError {
    #[error("invalid timestamp {value:?}")]
    Timestamp { value: String },

    #[error("invalid wrap-up duration {value:?} at {time}")]
    Duration { time: DateTime<Utc>, value: String },

    #[error("negative wrap-up duration {seconds}s at {time}")]
    NegativeDuration { time: DateTime<Utc>, seconds: i64 },

    #[error("missing agent at {time}")]
    MissingAgent { time: DateTime<Utc> },
}
