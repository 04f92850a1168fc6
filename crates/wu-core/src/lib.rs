//! Core domain logic for agent wrap-up statistics.
//!
//! This crate contains:
//! - Period sequences: fixed-length reporting windows over a time range
//! - Bucketing: splitting wrap-up intervals across window boundaries
//! - Aggregation: per-window, per-agent wrap-up totals from the queue log

mod aggregate;
mod aggregator;
mod bucket;
pub mod error;
pub mod event;
pub mod period;
pub mod types;

pub use aggregate::{
    AgentResolver, AggregationConfig, AggregationReport, AggregationRequest, EventLogReader,
    FetchedEvent, SkipCounts, aggregate,
};
pub use aggregator::{AgentAggregator, AgentWindowTotal};
pub use bucket::{IntervalBucketizer, WindowShare};
pub use error::{DataQualityError, StatsError};
pub use event::{RawWrapupEvent, WRAPUP_START_EVENT, parse_log_timestamp};
pub use period::PeriodSequence;
pub use types::{AgentId, AgentName, CallId, SplitPolicy, UnknownAgentPolicy, ValidationError};
