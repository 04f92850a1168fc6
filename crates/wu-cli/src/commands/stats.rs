//! Stats command for reading stored periodic statistics.

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use wu_db::Database;

use crate::commands::util::{format_seconds, format_time};

/// Prints stored wrap-up totals in `[start, end]`.
pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    json: bool,
) -> Result<()> {
    let totals = db.list_periodic_stats(start, end)?;

    if json {
        serde_json::to_writer_pretty(&mut *writer, &totals)?;
        writeln!(writer)?;
        return Ok(());
    }

    if totals.is_empty() {
        writeln!(writer, "No stored statistics in range.")?;
        return Ok(());
    }

    writeln!(writer, "{:<19}  {:>8}  {:>12}", "WINDOW", "AGENT", "WRAPUP")?;
    for total in totals {
        writeln!(
            writer,
            "{:<19}  {:>8}  {:>12}",
            format_time(total.window_boundary),
            total.agent_id,
            format_seconds(total.wrapup_seconds)
        )?;
    }
    Ok(())
}

/// Deletes stored totals for windows strictly after `after`.
pub fn prune<W: Write>(writer: &mut W, db: &mut Database, after: DateTime<Utc>) -> Result<()> {
    let removed = db.remove_periodic_stats_after(after)?;
    tracing::debug!(removed, %after, "pruned periodic stats");
    writeln!(
        writer,
        "Removed {removed} periodic rows after {}.",
        format_time(after)
    )?;
    Ok(())
}
