//! Aggregate command: wrap-up time per agent and window.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use wu_core::{
    AggregationReport, AggregationRequest, AgentWindowTotal, SkipCounts, SplitPolicy,
    UnknownAgentPolicy, aggregate,
};
use wu_db::Database;

use crate::Config;
use crate::cli::AggregateArgs;
use crate::commands::util::{format_seconds, format_time, parse_datetime, parse_window};

/// JSON shape of an aggregation result.
#[derive(Debug, Serialize)]
struct AggregateOutput<'a> {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    window_secs: i64,
    totals: &'a [AgentWindowTotal],
    skipped: SkipCounts,
    stored: Option<usize>,
}

/// Runs the aggregate command.
pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    config: &Config,
    args: &AggregateArgs,
) -> Result<()> {
    let start = parse_datetime(&args.start).context("invalid --start")?;
    let end = parse_datetime(&args.end).context("invalid --end")?;
    let window = match &args.window {
        Some(window) => parse_window(window).context("invalid --window")?,
        None => Duration::seconds(config.window_secs),
    };

    let mut aggregation = config.aggregation_config();
    if args.strict {
        aggregation.unknown_agent = UnknownAgentPolicy::Fail;
    }
    if args.spanning {
        aggregation.split = SplitPolicy::Spanning;
    }

    let directory = db.agent_directory().context("failed to load agents")?;
    let request = AggregationRequest::new(start, end, window);
    let report = aggregate(&*db, &directory, &request, &aggregation)
        .context("wrap-up aggregation failed")?;

    if report.skipped.total() > 0 {
        tracing::info!(
            malformed = report.skipped.malformed,
            unknown_agent = report.skipped.unknown_agent,
            out_of_range = report.skipped.out_of_range,
            "some wrap-up events did not contribute"
        );
    }

    let stored = if args.persist {
        Some(
            db.store_periodic_stats(start, end, &report.totals)
                .context("failed to store periodic stats")?,
        )
    } else {
        None
    };

    if args.json {
        write_json(writer, &report, stored)
    } else {
        write_table(writer, &report, stored)
    }
}

fn write_json<W: Write>(
    writer: &mut W,
    report: &AggregationReport,
    stored: Option<usize>,
) -> Result<()> {
    let totals = report.totals.totals();
    let output = AggregateOutput {
        start: report.request.start,
        end: report.request.end,
        window_secs: report.request.window_length.num_seconds(),
        totals: &totals,
        skipped: report.skipped,
        stored,
    };
    serde_json::to_writer_pretty(&mut *writer, &output)?;
    writeln!(writer)?;
    Ok(())
}

fn write_table<W: Write>(
    writer: &mut W,
    report: &AggregationReport,
    stored: Option<usize>,
) -> Result<()> {
    let request = &report.request;
    writeln!(
        writer,
        "Wrap-up time {} .. {} (window {})",
        format_time(request.start),
        format_time(request.end),
        format_seconds(request.window_length.num_seconds())
    )?;

    let totals = report.totals.totals();
    if totals.is_empty() {
        writeln!(writer, "No wrap-up time recorded.")?;
    } else {
        writeln!(writer, "{:<19}  {:>8}  {:>12}", "WINDOW", "AGENT", "WRAPUP")?;
        for total in &totals {
            writeln!(
                writer,
                "{:<19}  {:>8}  {:>12}",
                format_time(total.window_boundary),
                total.agent_id.value(),
                format_seconds(total.wrapup_seconds)
            )?;
        }
    }

    let skipped = report.skipped;
    writeln!(
        writer,
        "Events read: {}, skipped: {} malformed, {} unknown agent, {} out of range",
        report.events_read, skipped.malformed, skipped.unknown_agent, skipped.out_of_range
    )?;
    if let Some(stored) = stored {
        writeln!(writer, "Stored {stored} periodic rows.")?;
    }
    Ok(())
}
