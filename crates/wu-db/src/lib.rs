//! Storage layer for agent wrap-up statistics.
//!
//! Provides the queue log, the agent directory and the periodic statistics
//! table using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! Aggregation only reads the log once, up front, so the connection never has to
//! cross into the worker pool.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Queue-log times are TEXT in the PBX's native layout with microseconds
//! (e.g., `2012-07-03 08:47:40.000000`), always UTC. Writing every time with a
//! fixed width keeps lexicographic order equal to chronological order, which
//! the range queries rely on. [`Database::append_queue_log`] rewrites any
//! parseable time (RFC 3339, or native without a fraction) into this layout;
//! unparseable times are stored verbatim so the reader can count them.
//!
//! ## Payload Columns
//!
//! `data1` through `data5` are free-form strings whose meaning depends on the
//! `event` column. For `WRAPUPSTART`, `data1` holds the wrap-up length in
//! seconds. Payloads are parsed once when read, never stored typed.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use thiserror::Error;
use wu_core::{
    AgentAggregator, AgentId, AgentName, AgentResolver, AgentWindowTotal, CallId,
    DataQualityError, EventLogReader, FetchedEvent, RawWrapupEvent, StatsError,
    WRAPUP_START_EVENT, parse_log_timestamp,
};

/// Layout used for every time column.
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Queue name the PBX logs for events not tied to a queue.
const NO_QUEUE: &str = "NONE";

/// Prefix of agent channel names in the queue log.
const AGENT_CHANNEL_PREFIX: &str = "Agent/";

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored time could not be parsed.
    #[error("invalid stored time in {table}: {source}")]
    StoredTime {
        table: &'static str,
        #[source]
        source: DataQualityError,
    },
    /// A wrap-up duration that cannot be logged.
    #[error("invalid wrap-up duration: {0}")]
    InvalidDuration(i64),
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// A queue-log row as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueLogEntry {
    pub time: String,
    pub call_id: String,
    pub queue_name: String,
    pub agent: String,
    pub event: String,
    pub data1: Option<String>,
    pub data2: Option<String>,
    pub data3: Option<String>,
    pub data4: Option<String>,
    pub data5: Option<String>,
}

impl QueueLogEntry {
    /// A `WRAPUPSTART` row for `agent` lasting `duration_seconds`.
    pub fn wrapup_start(
        time: DateTime<Utc>,
        call_id: &CallId,
        agent: &AgentName,
        duration_seconds: i64,
    ) -> Result<Self, DbError> {
        if duration_seconds < 0 {
            return Err(DbError::InvalidDuration(duration_seconds));
        }
        Ok(Self {
            time: format_timestamp(time),
            call_id: call_id.to_string(),
            queue_name: NO_QUEUE.to_string(),
            agent: agent.to_string(),
            event: WRAPUP_START_EVENT.to_string(),
            data1: Some(duration_seconds.to_string()),
            data2: None,
            data3: None,
            data4: None,
            data5: None,
        })
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            time: row.get(0)?,
            call_id: row.get(1)?,
            queue_name: row.get(2)?,
            agent: row.get(3)?,
            event: row.get(4)?,
            data1: row.get(5)?,
            data2: row.get(6)?,
            data3: row.get(7)?,
            data4: row.get(8)?,
            data5: row.get(9)?,
        })
    }
}

/// A configured agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRecord {
    pub id: AgentId,
    pub number: String,
    pub firstname: String,
    pub lastname: String,
    pub context: String,
}

/// Fields for a new agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAgent {
    pub number: String,
    pub firstname: String,
    pub lastname: String,
    pub context: String,
}

impl NewAgent {
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            firstname: String::new(),
            lastname: String::new(),
            context: "default".to_string(),
        }
    }
}

/// Agent number lookup loaded once per aggregation run.
///
/// Log names resolve whether written as `Agent/<number>` or as the bare number.
#[derive(Debug, Clone, Default)]
pub struct AgentDirectory {
    by_number: HashMap<String, AgentId>,
}

impl AgentDirectory {
    pub fn from_records(records: &[AgentRecord]) -> Self {
        Self {
            by_number: records
                .iter()
                .map(|agent| (agent.number.clone(), agent.id))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }
}

impl AgentResolver for AgentDirectory {
    fn resolve(&self, agent_name: &AgentName) -> Result<AgentId, StatsError> {
        let name = agent_name.as_str();
        let number = name.strip_prefix(AGENT_CHANNEL_PREFIX).unwrap_or(name);
        self.by_number
            .get(number)
            .copied()
            .ok_or_else(|| StatsError::UnknownAgent(name.to_string()))
    }
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            -- Append-only call event log written by the PBX
            -- time: 'YYYY-MM-DD HH:MM:SS.ffffff', UTC
            -- data1..data5: event-specific payload strings
            CREATE TABLE IF NOT EXISTS queue_log (
                time TEXT NOT NULL,
                callid TEXT NOT NULL,
                queuename TEXT NOT NULL DEFAULT 'NONE',
                agent TEXT NOT NULL DEFAULT '',
                event TEXT NOT NULL,
                data1 TEXT,
                data2 TEXT,
                data3 TEXT,
                data4 TEXT,
                data5 TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_queue_log_time ON queue_log(time);
            CREATE INDEX IF NOT EXISTS idx_queue_log_event ON queue_log(event);
            CREATE INDEX IF NOT EXISTS idx_queue_log_callid ON queue_log(callid);

            CREATE TABLE IF NOT EXISTS agentfeatures (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                number TEXT NOT NULL UNIQUE,
                firstname TEXT NOT NULL DEFAULT '',
                lastname TEXT NOT NULL DEFAULT '',
                context TEXT NOT NULL DEFAULT 'default'
            );

            CREATE TABLE IF NOT EXISTS stat_agent_periodic (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                time TEXT NOT NULL,
                agent_id INTEGER NOT NULL,
                wrapup_time INTEGER NOT NULL DEFAULT 0,
                UNIQUE (time, agent_id),
                FOREIGN KEY (agent_id) REFERENCES agentfeatures(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_stat_agent_periodic_time ON stat_agent_periodic(time);
            ",
        )?;
        Ok(())
    }

    /// Appends rows to the queue log, normalizing parseable times to the
    /// fixed-width layout.
    pub fn append_queue_log(&mut self, entries: &[QueueLogEntry]) -> Result<usize, DbError> {
        if entries.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO queue_log
                (time, callid, queuename, agent, event, data1, data2, data3, data4, data5)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )?;
            for entry in entries {
                let time = parse_log_timestamp(&entry.time)
                    .map_or_else(|_| entry.time.clone(), format_timestamp);
                inserted += stmt.execute(params![
                    time,
                    entry.call_id,
                    entry.queue_name,
                    entry.agent,
                    entry.event,
                    entry.data1,
                    entry.data2,
                    entry.data3,
                    entry.data4,
                    entry.data5,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Lists queue-log rows with `time` in `[start, end]`, oldest first.
    pub fn list_queue_log_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<QueueLogEntry>, DbError> {
        if end < start {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "
            SELECT time, callid, queuename, agent, event, data1, data2, data3, data4, data5
            FROM queue_log
            WHERE time >= ? AND time <= ?
            ORDER BY time ASC, callid ASC
            ",
        )?;
        let rows = stmt.query_map(
            [format_timestamp(start), format_timestamp(end)],
            QueueLogEntry::from_row,
        )?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Reads `WRAPUPSTART` rows with `time` in `[start, end]`.
    ///
    /// Each row is parsed into a [`RawWrapupEvent`]; rows that fail to parse
    /// come back as errors for the caller to count.
    pub fn wrapup_events_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FetchedEvent>, DbError> {
        if end < start {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "
            SELECT time, agent, data1
            FROM queue_log
            WHERE event = ? AND time >= ? AND time <= ?
            ORDER BY time ASC, callid ASC
            ",
        )?;
        let rows = stmt.query_map(
            params![
                WRAPUP_START_EVENT,
                format_timestamp(start),
                format_timestamp(end),
            ],
            |row| {
                let time: String = row.get(0)?;
                let agent: Option<String> = row.get(1)?;
                let duration: Option<String> = row.get(2)?;
                Ok((time, agent, duration))
            },
        )?;
        let mut events = Vec::new();
        for row in rows {
            let (time, agent, duration) = row?;
            events.push(RawWrapupEvent::from_log_fields(
                &time,
                agent.as_deref(),
                duration.as_deref(),
            ));
        }
        Ok(events)
    }

    /// Adds an agent to the directory and returns its identifier.
    pub fn add_agent(&mut self, agent: &NewAgent) -> Result<AgentId, DbError> {
        self.conn.execute(
            "INSERT INTO agentfeatures (number, firstname, lastname, context) VALUES (?, ?, ?, ?)",
            params![agent.number, agent.firstname, agent.lastname, agent.context],
        )?;
        Ok(AgentId::new(self.conn.last_insert_rowid()))
    }

    /// Lists agents ordered by ID.
    pub fn list_agents(&self) -> Result<Vec<AgentRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, number, firstname, lastname, context FROM agentfeatures ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(AgentRecord {
                id: AgentId::new(row.get(0)?),
                number: row.get(1)?,
                firstname: row.get(2)?,
                lastname: row.get(3)?,
                context: row.get(4)?,
            })
        })?;
        let mut agents = Vec::new();
        for row in rows {
            agents.push(row?);
        }
        Ok(agents)
    }

    /// Loads the whole agent directory for name resolution.
    pub fn agent_directory(&self) -> Result<AgentDirectory, DbError> {
        Ok(AgentDirectory::from_records(&self.list_agents()?))
    }

    /// Replaces the periodic statistics for windows in `[start, end]`.
    ///
    /// Existing rows in the range are removed first, so re-running an
    /// aggregation over the same range overwrites instead of accumulating.
    pub fn store_periodic_stats(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        totals: &AgentAggregator,
    ) -> Result<usize, DbError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM stat_agent_periodic WHERE time >= ? AND time <= ?",
            [format_timestamp(start), format_timestamp(end)],
        )?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO stat_agent_periodic (time, agent_id, wrapup_time)
                VALUES (?, ?, ?)
                ON CONFLICT(time, agent_id) DO UPDATE SET wrapup_time = excluded.wrapup_time
                ",
            )?;
            for total in totals.totals() {
                inserted += stmt.execute(params![
                    format_timestamp(total.window_boundary),
                    total.agent_id.value(),
                    total.wrapup_seconds,
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(inserted, "stored periodic agent stats");
        Ok(inserted)
    }

    /// Lists periodic statistics with window boundaries in `[start, end]`.
    pub fn list_periodic_stats(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AgentWindowTotal>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT time, agent_id, wrapup_time
            FROM stat_agent_periodic
            WHERE time >= ? AND time <= ?
            ORDER BY time ASC, agent_id ASC
            ",
        )?;
        let rows = stmt.query_map([format_timestamp(start), format_timestamp(end)], |row| {
            let time: String = row.get(0)?;
            let agent_id: i64 = row.get(1)?;
            let wrapup_seconds: i64 = row.get(2)?;
            Ok((time, agent_id, wrapup_seconds))
        })?;
        let mut totals = Vec::new();
        for row in rows {
            let (time, agent_id, wrapup_seconds) = row?;
            let window_boundary =
                parse_log_timestamp(&time).map_err(|source| DbError::StoredTime {
                    table: "stat_agent_periodic",
                    source,
                })?;
            totals.push(AgentWindowTotal {
                window_boundary,
                agent_id: AgentId::new(agent_id),
                wrapup_seconds,
            });
        }
        Ok(totals)
    }

    /// Deletes periodic statistics for windows strictly after `time`.
    pub fn remove_periodic_stats_after(&mut self, time: DateTime<Utc>) -> Result<usize, DbError> {
        let removed = self.conn.execute(
            "DELETE FROM stat_agent_periodic WHERE time > ?",
            [format_timestamp(time)],
        )?;
        Ok(removed)
    }
}

impl EventLogReader for Database {
    type Error = DbError;

    fn fetch_wrapups(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FetchedEvent>, Self::Error> {
        self.wrapup_events_in_range(start, end)
    }
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format(TIME_FORMAT).to_string()
}
