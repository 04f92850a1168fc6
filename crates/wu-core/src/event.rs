//! Wrap-up events parsed from the queue log.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DataQualityError;
use crate::types::AgentName;

/// Queue-log `event` value of a row that starts agent wrap-up.
pub const WRAPUP_START_EVENT: &str = "WRAPUPSTART";

/// Timestamp layout the PBX writes into the queue log.
const QUEUE_LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// An agent entering post-call wrap-up, with the wrap-up length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawWrapupEvent {
    /// Agent string as logged, not yet resolved.
    pub agent_name: AgentName,
    /// When wrap-up started.
    pub start: DateTime<Utc>,
    /// Wrap-up length in whole seconds. Never negative.
    pub duration_seconds: i64,
}

impl RawWrapupEvent {
    /// Parses the untyped queue-log columns of a `WRAPUPSTART` row.
    ///
    /// `duration` comes from the first payload column; a missing or blank
    /// value means zero seconds.
    pub fn from_log_fields(
        time: &str,
        agent: Option<&str>,
        duration: Option<&str>,
    ) -> Result<Self, DataQualityError> {
        let start = parse_log_timestamp(time)?;
        let agent_name = agent
            .and_then(|a| AgentName::new(a).ok())
            .ok_or(DataQualityError::MissingAgent { time: start })?;
        let duration_seconds = match duration.map(str::trim) {
            None | Some("") => 0,
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| DataQualityError::Duration {
                    time: start,
                    value: raw.to_string(),
                })?,
        };
        if duration_seconds < 0 {
            return Err(DataQualityError::NegativeDuration {
                time: start,
                seconds: duration_seconds,
            });
        }
        if Duration::try_seconds(duration_seconds)
            .and_then(|d| start.checked_add_signed(d))
            .is_none()
        {
            return Err(DataQualityError::Duration {
                time: start,
                value: duration_seconds.to_string(),
            });
        }
        Ok(Self {
            agent_name,
            start,
            duration_seconds,
        })
    }

    /// When wrap-up ended.
    ///
    /// Events built by [`Self::from_log_fields`] always have a representable
    /// end; anything else saturates at the latest representable time.
    pub fn end(&self) -> DateTime<Utc> {
        Duration::try_seconds(self.duration_seconds)
            .and_then(|d| self.start.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Parses a queue-log timestamp.
///
/// Accepts RFC 3339 as well as the PBX's native `YYYY-MM-DD HH:MM:SS.ffffff`,
/// which carries no offset and is read as UTC.
pub fn parse_log_timestamp(value: &str) -> Result<DateTime<Utc>, DataQualityError> {
    let trimmed = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(trimmed, QUEUE_LOG_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| DataQualityError::Timestamp {
            value: value.to_string(),
        })
}
