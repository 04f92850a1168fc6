//! Log command for appending to and reading the queue log.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;
use wu_core::{AgentName, CallId};
use wu_db::{Database, QueueLogEntry};

use crate::commands::util::parse_datetime;

/// Appends a `WRAPUPSTART` event.
pub fn wrapup<W: Write>(
    writer: &mut W,
    db: &mut Database,
    agent: &str,
    duration: i64,
    at: Option<&str>,
    call_id: Option<&str>,
) -> Result<()> {
    let time = at.map_or_else(|| Ok(Utc::now()), parse_datetime)?;
    let agent = AgentName::new(agent).context("invalid --agent")?;
    let call_id = match call_id {
        Some(id) => CallId::new(id).context("invalid --call-id")?,
        None => CallId::new(Uuid::new_v4().to_string())?,
    };

    let entry = QueueLogEntry::wrapup_start(time, &call_id, &agent, duration)?;
    db.append_queue_log(std::slice::from_ref(&entry))
        .context("failed to append to queue log")?;
    tracing::debug!(%agent, %call_id, duration, "wrap-up logged");

    writeln!(
        writer,
        "Logged {duration}s wrap-up for {agent} at {} ({call_id})",
        entry.time
    )?;
    Ok(())
}

/// Prints queue-log rows in `[start, end]`.
pub fn list<W: Write>(
    writer: &mut W,
    db: &Database,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<()> {
    let entries = db.list_queue_log_in_range(start, end)?;
    if entries.is_empty() {
        writeln!(writer, "No events in range.")?;
        return Ok(());
    }

    for entry in entries {
        let data: Vec<&str> = [
            &entry.data1,
            &entry.data2,
            &entry.data3,
            &entry.data4,
            &entry.data5,
        ]
        .into_iter()
        .map(|d| d.as_deref().unwrap_or(""))
        .collect();
        writeln!(
            writer,
            "{}|{}|{}|{}|{}|{}",
            entry.time,
            entry.call_id,
            entry.queue_name,
            entry.agent,
            entry.event,
            data.join("|")
        )?;
    }
    Ok(())
}
