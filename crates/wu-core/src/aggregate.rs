//! Wrap-up aggregation driver.
//!
//! Reads wrap-up events for the reporting range plus a short lookback, splits
//! each wrap-up interval over the reporting windows and sums the shares per
//! agent. Bad rows and unknown agents are skipped and counted; only an
//! invalid range or a failed read aborts the run.

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use serde::Serialize;

use crate::aggregator::AgentAggregator;
use crate::bucket::IntervalBucketizer;
use crate::error::{DataQualityError, StatsError};
use crate::event::RawWrapupEvent;
use crate::period::PeriodSequence;
use crate::types::{AgentId, AgentName, SplitPolicy, UnknownAgentPolicy};

/// One row handed back by an [`EventLogReader`], already parsed.
pub type FetchedEvent = Result<RawWrapupEvent, DataQualityError>;

/// Source of wrap-up events.
///
/// Implementations return every wrap-up-start row whose time lies in
/// `[start, end]`, in any order. Rows that cannot be parsed are returned as
/// errors so the driver can count them.
pub trait EventLogReader {
    type Error: std::error::Error + Send + Sync + 'static;

    fn fetch_wrapups(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FetchedEvent>, Self::Error>;
}

/// Maps logged agent names to configured agents.
pub trait AgentResolver {
    /// Fails with [`StatsError::UnknownAgent`] when no agent matches.
    fn resolve(&self, agent_name: &AgentName) -> Result<AgentId, StatsError>;
}

impl<S: std::hash::BuildHasher> AgentResolver for std::collections::HashMap<AgentName, AgentId, S> {
    fn resolve(&self, agent_name: &AgentName) -> Result<AgentId, StatsError> {
        self.get(agent_name)
            .copied()
            .ok_or_else(|| StatsError::UnknownAgent(agent_name.to_string()))
    }
}

/// Tuning for an aggregation run.
#[derive(Debug, Clone)]
pub struct AggregationConfig {
    /// How far before the reporting start to look for wrap-ups still running
    /// into the first window. Default: 2 minutes.
    pub lookback: Duration,

    /// Default: skip and count.
    pub unknown_agent: UnknownAgentPolicy,

    /// Default: [`SplitPolicy::Adjacent`].
    pub split: SplitPolicy,

    /// Batches at least this large are split across the rayon pool.
    /// Default: 4096.
    pub parallel_threshold: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            lookback: Duration::minutes(2),
            unknown_agent: UnknownAgentPolicy::Skip,
            split: SplitPolicy::Adjacent,
            parallel_threshold: 4096,
        }
    }
}

/// The range to report on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationRequest {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub window_length: Duration,
}

impl AggregationRequest {
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>, window_length: Duration) -> Self {
        Self {
            start,
            end,
            window_length,
        }
    }
}

/// Rows that were read but did not contribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkipCounts {
    /// Rows with an unparseable time, duration or agent.
    pub malformed: usize,
    /// Rows whose agent could not be resolved.
    pub unknown_agent: usize,
    /// Rows that landed in no window.
    pub out_of_range: usize,
}

impl SkipCounts {
    fn merge(&mut self, other: Self) {
        self.malformed += other.malformed;
        self.unknown_agent += other.unknown_agent;
        self.out_of_range += other.out_of_range;
    }

    pub const fn total(&self) -> usize {
        self.malformed + self.unknown_agent + self.out_of_range
    }
}

/// Result of an aggregation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationReport {
    pub request: AggregationRequest,
    pub totals: AgentAggregator,
    pub skipped: SkipCounts,
    pub events_read: usize,
}

/// Per-worker accumulation state.
#[derive(Debug, Default)]
struct Partial {
    totals: AgentAggregator,
    skipped: SkipCounts,
}

impl Partial {
    fn merge(mut self, other: Self) -> Self {
        self.totals.merge(other.totals);
        self.skipped.merge(other.skipped);
        self
    }
}

struct Pass<'a, R: ?Sized> {
    bucketizer: IntervalBucketizer<'a>,
    resolver: &'a R,
    policy: UnknownAgentPolicy,
    query_start: DateTime<Utc>,
    query_end: DateTime<Utc>,
}

impl<R: AgentResolver + ?Sized> Pass<'_, R> {
    fn apply(&self, mut partial: Partial, row: &FetchedEvent) -> Result<Partial, StatsError> {
        let event = match row {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, "skipping malformed wrap-up event");
                partial.skipped.malformed += 1;
                return Ok(partial);
            }
        };

        if event.start < self.query_start || event.start > self.query_end {
            partial.skipped.out_of_range += 1;
            return Ok(partial);
        }

        let agent_id = match self.resolver.resolve(&event.agent_name) {
            Ok(agent_id) => agent_id,
            Err(err @ StatsError::UnknownAgent(_)) => {
                if self.policy == UnknownAgentPolicy::Fail {
                    return Err(err);
                }
                tracing::warn!(agent = %event.agent_name, time = %event.start, "skipping wrap-up for unknown agent");
                partial.skipped.unknown_agent += 1;
                return Ok(partial);
            }
            Err(err) => return Err(err),
        };

        let shares = self.bucketizer.split(event.start, event.end());
        if shares.is_empty() {
            partial.skipped.out_of_range += 1;
            return Ok(partial);
        }
        for share in shares {
            partial.totals.add(share.boundary, agent_id, share.duration);
        }
        Ok(partial)
    }
}

/// Computes wrap-up totals per window and agent for `request`.
///
/// The range must not be inverted and the window length must be positive;
/// both are checked before the log is read.
pub fn aggregate<L, R>(
    log: &L,
    resolver: &R,
    request: &AggregationRequest,
    config: &AggregationConfig,
) -> Result<AggregationReport, StatsError>
where
    L: EventLogReader + ?Sized,
    R: AgentResolver + Sync + ?Sized,
{
    if request.end < request.start {
        return Err(StatsError::InvalidConfiguration(format!(
            "report end {} is before report start {}",
            request.end, request.start
        )));
    }
    if config.lookback < Duration::zero() {
        return Err(StatsError::InvalidConfiguration(format!(
            "lookback must not be negative, got {}s",
            config.lookback.num_seconds()
        )));
    }
    let periods = PeriodSequence::generate(request.start, request.end, request.window_length)?;

    let query_start = request.start - config.lookback;
    let rows = log
        .fetch_wrapups(query_start, request.end)
        .map_err(StatsError::upstream)?;

    let pass = Pass {
        bucketizer: IntervalBucketizer::new(&periods, config.split),
        resolver,
        policy: config.unknown_agent,
        query_start,
        query_end: request.end,
    };

    let partial = if rows.len() >= config.parallel_threshold {
        rows.par_iter()
            .try_fold(Partial::default, |partial, row| pass.apply(partial, row))
            .try_reduce(Partial::default, |a, b| Ok(a.merge(b)))?
    } else {
        rows.iter()
            .try_fold(Partial::default(), |partial, row| pass.apply(partial, row))?
    };

    tracing::debug!(
        start = %request.start,
        end = %request.end,
        windows = periods.len(),
        events = rows.len(),
        entries = partial.totals.len(),
        skipped = partial.skipped.total(),
        "aggregated wrap-up time"
    );

    Ok(AggregationReport {
        request: *request,
        totals: partial.totals,
        skipped: partial.skipped,
        events_read: rows.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::cell::Cell;
    use std::collections::HashMap;

    /// In-memory log honouring the reader contract.
    struct MemoryLog {
        rows: Vec<FetchedEvent>,
        reads: Cell<usize>,
    }

    impl MemoryLog {
        fn new(rows: Vec<FetchedEvent>) -> Self {
            Self {
                rows,
                reads: Cell::new(0),
            }
        }
    }

    impl EventLogReader for MemoryLog {
        type Error = std::io::Error;

        fn fetch_wrapups(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<FetchedEvent>, Self::Error> {
            self.reads.set(self.reads.get() + 1);
            Ok(self
                .rows
                .iter()
                .filter(|row| match row {
                    Ok(event) => event.start >= start && event.start <= end,
                    Err(_) => true,
                })
                .cloned()
                .collect())
        }
    }

    struct BrokenLog;

    impl EventLogReader for BrokenLog {
        type Error = std::io::Error;

        fn fetch_wrapups(
            &self,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<FetchedEvent>, Self::Error> {
            Err(std::io::Error::other("connection refused"))
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2012, 7, 3, 8, 0, 0)
            .single()
            .expect("valid test timestamp")
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(seconds)
    }

    fn wrapup(agent: &str, start: i64, duration: i64) -> FetchedEvent {
        Ok(RawWrapupEvent {
            agent_name: AgentName::new(agent).unwrap(),
            start: at(start),
            duration_seconds: duration,
        })
    }

    fn agents() -> HashMap<AgentName, AgentId> {
        [("42", 42), ("7", 7)]
            .into_iter()
            .map(|(name, id)| (AgentName::new(name).unwrap(), AgentId::new(id)))
            .collect()
    }

    fn half_hours(end: i64) -> AggregationRequest {
        AggregationRequest::new(t0(), at(end), Duration::seconds(1800))
    }

    fn run(rows: Vec<FetchedEvent>, request: &AggregationRequest) -> AggregationReport {
        aggregate(
            &MemoryLog::new(rows),
            &agents(),
            request,
            &AggregationConfig::default(),
        )
        .expect("aggregation succeeds")
    }

    #[test]
    fn single_window_interval_is_credited_whole() {
        let report = run(vec![wrapup("42", 100, 50)], &half_hours(3600));

        assert_eq!(
            report.totals.get(t0()),
            vec![(AgentId::new(42), Duration::seconds(50))]
        );
        assert_eq!(report.totals.windows().collect::<Vec<_>>(), vec![t0()]);
    }

    #[test]
    fn interval_crossing_boundary_is_split() {
        let report = run(vec![wrapup("42", 1790, 20)], &half_hours(3600));
        let agent = AgentId::new(42);

        assert_eq!(report.totals.total(t0(), agent), Duration::seconds(10));
        assert_eq!(report.totals.total(at(1800), agent), Duration::seconds(10));
        assert_eq!(report.totals.len(), 2);
    }

    #[test]
    fn intervals_in_same_window_are_summed() {
        let report = run(
            vec![wrapup("42", 100, 30), wrapup("42", 600, 45)],
            &half_hours(3600),
        );
        assert_eq!(
            report.totals.total(t0(), AgentId::new(42)),
            Duration::seconds(75)
        );
    }

    #[test]
    fn events_before_lookback_are_excluded() {
        // Starts three minutes early and runs ten minutes into the range.
        let report = run(vec![wrapup("42", -180, 780)], &half_hours(3600));
        assert!(report.totals.is_empty());
        assert_eq!(report.events_read, 0);
    }

    #[test]
    fn events_inside_lookback_credit_their_overlap() {
        let report = run(vec![wrapup("42", -60, 90)], &half_hours(3600));
        assert_eq!(
            report.totals.total(t0(), AgentId::new(42)),
            Duration::seconds(30)
        );
    }

    #[test]
    fn lookback_event_ending_before_range_is_counted_out_of_range() {
        let report = run(vec![wrapup("42", -60, 30)], &half_hours(3600));
        assert!(report.totals.is_empty());
        assert_eq!(report.skipped.out_of_range, 1);
    }

    #[test]
    fn reader_rows_outside_query_range_are_ignored() {
        struct LeakyLog(Vec<FetchedEvent>);

        impl EventLogReader for LeakyLog {
            type Error = std::io::Error;

            fn fetch_wrapups(
                &self,
                _start: DateTime<Utc>,
                _end: DateTime<Utc>,
            ) -> Result<Vec<FetchedEvent>, Self::Error> {
                Ok(self.0.clone())
            }
        }

        let log = LeakyLog(vec![wrapup("42", -600, 900), wrapup("42", 100, 10)]);
        let report = aggregate(
            &log,
            &agents(),
            &half_hours(3600),
            &AggregationConfig::default(),
        )
        .unwrap();
        assert_eq!(
            report.totals.get(t0()),
            vec![(AgentId::new(42), Duration::seconds(10))]
        );
        assert_eq!(report.skipped.out_of_range, 1);
    }

    #[test]
    fn unknown_agent_is_skipped_and_counted() {
        let report = run(
            vec![wrapup("999", 100, 50), wrapup("42", 200, 10)],
            &half_hours(3600),
        );

        assert_eq!(report.skipped.unknown_agent, 1);
        assert_eq!(
            report.totals.get(t0()),
            vec![(AgentId::new(42), Duration::seconds(10))]
        );
    }

    #[test]
    fn unknown_agent_fails_under_strict_policy() {
        let config = AggregationConfig {
            unknown_agent: UnknownAgentPolicy::Fail,
            ..AggregationConfig::default()
        };
        let err = aggregate(
            &MemoryLog::new(vec![wrapup("999", 100, 50)]),
            &agents(),
            &half_hours(3600),
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, StatsError::UnknownAgent(name) if name == "999"));
    }

    #[test]
    fn malformed_rows_are_skipped_and_counted() {
        let rows = vec![
            Err(DataQualityError::Timestamp {
                value: "garbage".to_string(),
            }),
            Err(DataQualityError::NegativeDuration {
                time: at(10),
                seconds: -5,
            }),
            wrapup("7", 100, 20),
        ];
        let report = run(rows, &half_hours(3600));

        assert_eq!(report.skipped.malformed, 2);
        assert_eq!(
            report.totals.total(t0(), AgentId::new(7)),
            Duration::seconds(20)
        );
        assert!(
            report
                .totals
                .totals()
                .iter()
                .all(|total| total.wrapup_seconds >= 0)
        );
    }

    #[test]
    fn invalid_range_fails_before_reading() {
        let log = MemoryLog::new(vec![wrapup("42", 100, 50)]);
        let request = AggregationRequest::new(at(3600), t0(), Duration::seconds(1800));
        let err = aggregate(&log, &agents(), &request, &AggregationConfig::default()).unwrap_err();
        assert!(matches!(err, StatsError::InvalidConfiguration(_)));
        assert_eq!(log.reads.get(), 0);

        let request = AggregationRequest::new(t0(), at(3600), Duration::zero());
        let err = aggregate(&log, &agents(), &request, &AggregationConfig::default()).unwrap_err();
        assert!(matches!(err, StatsError::InvalidConfiguration(_)));
        assert_eq!(log.reads.get(), 0);
    }

    #[test]
    fn reader_failure_aborts_the_run() {
        let err = aggregate(
            &BrokenLog,
            &agents(),
            &half_hours(3600),
            &AggregationConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, StatsError::UpstreamRead(_)));
        assert_eq!(err.to_string(), "failed to read event log");
    }

    #[test]
    fn repeated_runs_are_identical() {
        let rows = vec![
            wrapup("42", 100, 50),
            wrapup("7", 1790, 40),
            wrapup("42", 3000, 700),
        ];
        let first = run(rows.clone(), &half_hours(3600));
        let second = run(rows, &half_hours(3600));
        assert_eq!(first, second);
    }

    #[test]
    fn input_order_does_not_matter() {
        let rows = vec![
            wrapup("42", 100, 50),
            wrapup("7", 1790, 40),
            wrapup("42", 1795, 20),
            wrapup("7", 3500, 200),
        ];
        let mut reversed = rows.clone();
        reversed.reverse();

        let forward = run(rows, &half_hours(3600));
        let backward = run(reversed, &half_hours(3600));
        assert_eq!(forward.totals, backward.totals);
    }

    #[test]
    fn parallel_and_sequential_runs_agree() {
        let rows: Vec<_> = (0..500)
            .map(|i| {
                let agent = if i % 3 == 0 { "7" } else { "42" };
                wrapup(agent, i * 13 - 100, i % 97)
            })
            .chain(std::iter::once(wrapup("999", 50, 10)))
            .collect();
        let request = half_hours(7200);

        let sequential = aggregate(
            &MemoryLog::new(rows.clone()),
            &agents(),
            &request,
            &AggregationConfig::default(),
        )
        .unwrap();
        let parallel = aggregate(
            &MemoryLog::new(rows),
            &agents(),
            &request,
            &AggregationConfig {
                parallel_threshold: 1,
                ..AggregationConfig::default()
            },
        )
        .unwrap();

        assert_eq!(sequential, parallel);
        assert_eq!(parallel.skipped.unknown_agent, 1);
    }

    #[test]
    fn adjacent_policy_loses_time_between_windows() {
        let rows = vec![wrapup("42", 1700, 2300)];
        let adjacent = run(rows.clone(), &half_hours(7200));
        let agent = AgentId::new(42);
        assert_eq!(adjacent.totals.total(at(1800), agent), Duration::zero());

        let spanning = aggregate(
            &MemoryLog::new(rows),
            &agents(),
            &half_hours(7200),
            &AggregationConfig {
                split: SplitPolicy::Spanning,
                ..AggregationConfig::default()
            },
        )
        .unwrap();
        assert_eq!(
            spanning.totals.total(at(1800), agent),
            Duration::seconds(1800)
        );
        let credited: i64 = spanning
            .totals
            .totals()
            .iter()
            .map(|t| t.wrapup_seconds)
            .sum();
        assert_eq!(credited, 2300);
    }
}
