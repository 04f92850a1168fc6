//! Shared utilities for CLI commands.

use std::sync::LazyLock;

use anyhow::Context;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use regex::Regex;

/// Pre-compiled regex for relative time parsing.
static RELATIVE_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+(minute|hour|day|week)s?\s+ago$").unwrap());

/// Pre-compiled regex for window lengths such as `30m` or `900`.
static WINDOW_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)\s*([smhd]?)$").unwrap());

/// Conservative bounds for relative time parsing (~1000 years in minutes).
const MAX_RELATIVE_MINUTES: i64 = 1000 * 365 * 24 * 60;

/// Upper bound for window lengths (one year in seconds).
const MAX_WINDOW_SECONDS: i64 = 365 * 24 * 60 * 60;

/// Parse a datetime string as either ISO 8601 or relative time.
///
/// Supports:
/// - ISO 8601: "2026-01-15T10:30:00Z"
/// - Relative: "2 hours ago", "30 minutes ago", "1 day ago", "1 week ago"
/// - "now"
///
/// Results are truncated to whole seconds so window boundaries derived from
/// them never split a wrap-up into fractional shares.
pub fn parse_datetime(s: &str) -> anyhow::Result<DateTime<Utc>> {
    parse_datetime_at(s, Utc::now()).map(|dt| dt.trunc_subsecs(0))
}

fn parse_datetime_at(s: &str, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    if s == "now" {
        return Ok(now);
    }

    // Try ISO 8601 first
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Try relative time: "N hours/minutes/days/weeks ago"
    let Some(caps) = RELATIVE_TIME_RE.captures(s) else {
        anyhow::bail!(
            "Invalid datetime: {s}. Use ISO 8601 (e.g., 2026-01-15T10:30:00Z) or relative (e.g., '2 hours ago')"
        );
    };

    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in relative time")?;

    let (max_for_unit, minutes_per_unit) = match &caps[2] {
        "minute" => (MAX_RELATIVE_MINUTES, 1),
        "hour" => (MAX_RELATIVE_MINUTES / 60, 60),
        "day" => (MAX_RELATIVE_MINUTES / (60 * 24), 60 * 24),
        "week" => (MAX_RELATIVE_MINUTES / (60 * 24 * 7), 60 * 24 * 7),
        unit => anyhow::bail!("Unknown time unit: {unit}"),
    };

    if n > max_for_unit {
        anyhow::bail!("Relative time value too large: {n} {}", &caps[2]);
    }

    let duration = Duration::minutes(n * minutes_per_unit);
    Ok(now - duration)
}

/// Parse a window length: a number with an optional `s`, `m`, `h` or `d`
/// suffix. A bare number is seconds.
pub fn parse_window(s: &str) -> anyhow::Result<Duration> {
    let Some(caps) = WINDOW_RE.captures(s.trim()) else {
        anyhow::bail!("Invalid window length: {s}. Use e.g. 900, 15m, 1h");
    };

    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in window length")?;
    let seconds_per_unit = match &caps[2] {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        unit => anyhow::bail!("Unknown window unit: {unit}"),
    };

    let seconds = n
        .checked_mul(seconds_per_unit)
        .filter(|&secs| secs <= MAX_WINDOW_SECONDS)
        .with_context(|| format!("Window length too large: {s}"))?;
    if seconds == 0 {
        anyhow::bail!("Window length must be positive: {s}");
    }
    Ok(Duration::seconds(seconds))
}

/// Formats seconds as `Hh Mm Ss`, dropping leading zero units.
pub fn format_seconds(total: i64) -> String {
    let total = total.max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Formats a window boundary for tables.
pub fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}
