//! Fixed-length reporting windows.

use chrono::{DateTime, Duration, Utc};

use crate::error::StatsError;

/// The ordered window boundaries covering a reporting range.
///
/// Boundaries start at `start` and advance by `interval`, up to and including
/// the first boundary at or after `end`. Each boundary opens the half-open
/// window `[boundary, boundary + interval)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodSequence {
    start: DateTime<Utc>,
    interval: Duration,
    interval_ns: i64,
    len: usize,
}

impl PeriodSequence {
    /// Builds the sequence for `[start, end]`.
    ///
    /// Fails with [`StatsError::InvalidConfiguration`] when `interval` is not
    /// positive. An inverted range yields an empty sequence.
    pub fn generate(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Duration,
    ) -> Result<Self, StatsError> {
        let interval_ns = interval
            .num_nanoseconds()
            .filter(|&ns| ns > 0)
            .ok_or_else(|| {
                StatsError::InvalidConfiguration(format!(
                    "window length must be positive, got {}s",
                    interval.num_seconds()
                ))
            })?;

        let len = if start > end {
            0
        } else {
            let span_ns = (end - start).num_nanoseconds().ok_or_else(|| {
                StatsError::InvalidConfiguration("reporting range is too long".to_string())
            })?;
            let steps = span_ns.div_euclid(interval_ns) + i64::from(span_ns % interval_ns != 0);
            usize::try_from(steps)
                .ok()
                .and_then(|steps| steps.checked_add(1))
                .ok_or_else(|| {
                    StatsError::InvalidConfiguration("too many windows in range".to_string())
                })?
        };

        Ok(Self {
            start,
            interval,
            interval_ns,
            len,
        })
    }

    /// Window length.
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of boundaries.
    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The boundary at `index`, if it exists.
    pub fn boundary(&self, index: usize) -> Option<DateTime<Utc>> {
        if index >= self.len {
            return None;
        }
        let steps = i32::try_from(index).ok()?;
        Some(self.start + self.interval * steps)
    }

    /// Iterates the boundaries in order. Each call starts from the beginning.
    pub fn boundaries(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        (0..self.len).filter_map(|index| self.boundary(index))
    }

    /// Index of the greatest boundary strictly less than `t`.
    ///
    /// Times past the last boundary map to the last window; times at or before
    /// the first boundary have no window.
    pub fn floor_index(&self, t: DateTime<Utc>) -> Option<usize> {
        if self.len == 0 || t <= self.start {
            return None;
        }
        let last = self.len - 1;
        let Some(offset_ns) = (t - self.start).num_nanoseconds() else {
            return Some(last);
        };
        let index = (offset_ns - 1) / self.interval_ns;
        Some(usize::try_from(index).map_or(last, |index| index.min(last)))
    }
}
