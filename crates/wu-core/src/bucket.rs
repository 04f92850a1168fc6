//! Splitting a wrap-up interval across reporting windows.
//!
//! # Algorithm
//!
//! 1. The starting window is the greatest boundary strictly before the
//!    interval start. Intervals starting at or before the first boundary have
//!    none.
//! 2. The ending window is the greatest boundary strictly before the interval
//!    end. Ends past the last boundary stay in the last window.
//! 3. The starting window gets `min(end, boundary + length) - start`.
//! 4. A different ending window gets `end - boundary`.
//!
//! Only those two windows are credited under [`SplitPolicy::Adjacent`], so an
//! interval longer than one window loses the windows in between.
//! [`SplitPolicy::Spanning`] credits those as well.

use chrono::{DateTime, Duration, Utc};

use crate::period::PeriodSequence;
use crate::types::SplitPolicy;

/// Time credited to one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowShare {
    pub boundary: DateTime<Utc>,
    pub duration: Duration,
}

/// Assigns interval durations to the windows of a [`PeriodSequence`].
#[derive(Debug, Clone, Copy)]
pub struct IntervalBucketizer<'a> {
    periods: &'a PeriodSequence,
    policy: SplitPolicy,
}

impl<'a> IntervalBucketizer<'a> {
    pub const fn new(periods: &'a PeriodSequence, policy: SplitPolicy) -> Self {
        Self { periods, policy }
    }

    /// Returns the positive shares of `[start, end)` per window, in window order.
    ///
    /// An empty result means the interval touches no window.
    pub fn split(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<WindowShare> {
        let mut shares = Vec::with_capacity(2);
        let starting = self.periods.floor_index(start);
        let ending = self.periods.floor_index(end);
        let length = self.periods.interval();

        if let Some(index) = starting {
            if let Some(boundary) = self.periods.boundary(index) {
                let range_end = boundary + length;
                push_share(&mut shares, boundary, end.min(range_end) - start);
            }
        }

        let Some(ending) = ending else {
            return shares;
        };
        if starting == Some(ending) {
            return shares;
        }

        if self.policy == SplitPolicy::Spanning {
            let first_between = starting.map_or(0, |index| index + 1);
            for index in first_between..ending {
                if let Some(boundary) = self.periods.boundary(index) {
                    let share = end.min(boundary + length) - start.max(boundary);
                    push_share(&mut shares, boundary, share);
                }
            }
        }

        if let Some(boundary) = self.periods.boundary(ending) {
            push_share(&mut shares, boundary, end - boundary);
        }
        shares
    }
}

fn push_share(shares: &mut Vec<WindowShare>, boundary: DateTime<Utc>, duration: Duration) {
    if duration > Duration::zero() {
        shares.push(WindowShare { boundary, duration });
    }
}
