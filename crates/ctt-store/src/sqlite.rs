//! SQLite cache backend.
//!
//! # Schema
//!
//! `partitions` has one row per cached source; a partition with zero events
//! is distinct from one that was never cached. `cached_events` holds the
//! events, keyed by `(source_id, position)` so the persisted order is the
//! reconciled order.
//!
//! Timestamps are stored as TEXT in RFC 3339 with millisecond precision
//! (e.g. `2024-01-15T10:30:00.000Z`), which sorts chronologically.
//!
//! A partition is replaced inside one transaction, so readers see either the
//! old or the new content.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use ctt_core::{Event, SourceId, Uid};
use rusqlite::{Connection, OptionalExtension, params};

use crate::{CacheBackend, StoreError};

/// Stores partitions in a SQLite database.
#[derive(Debug)]
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The schema is initialized on first open.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Opens an in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Initializes the schema. Idempotent.
    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS partitions (
                source_id TEXT PRIMARY KEY,
                updated_at TEXT NOT NULL
            );

            -- start_at/end_at: RFC 3339 UTC; uid NULL for anonymous events
            CREATE TABLE IF NOT EXISTS cached_events (
                source_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                uid TEXT,
                title TEXT NOT NULL,
                start_at TEXT NOT NULL,
                end_at TEXT NOT NULL,
                duration_hours REAL NOT NULL,
                PRIMARY KEY (source_id, position),
                FOREIGN KEY (source_id) REFERENCES partitions(source_id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_cached_events_start ON cached_events(source_id, start_at);
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl CacheBackend for SqliteBackend {
    fn load(&self, source_id: &SourceId) -> Result<Option<Vec<Event>>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);

        let known: Option<String> = conn
            .query_row(
                "SELECT source_id FROM partitions WHERE source_id = ?",
                [source_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if known.is_none() {
            return Ok(None);
        }

        let mut stmt = conn.prepare(
            "
            SELECT uid, title, start_at, end_at
            FROM cached_events
            WHERE source_id = ?
            ORDER BY position ASC
            ",
        )?;
        let rows = stmt.query_map([source_id.as_str()], |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (uid, title, start_at, end_at) = row?;
            events.push(event_from_row(source_id, uid, title, &start_at, &end_at)?);
        }
        Ok(Some(events))
    }

    fn store(&self, source_id: &SourceId, events: &[Event]) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = conn.transaction()?;
        tx.execute(
            "
            INSERT INTO partitions (source_id, updated_at) VALUES (?, ?)
            ON CONFLICT(source_id) DO UPDATE SET updated_at = excluded.updated_at
            ",
            params![source_id.as_str(), format_timestamp(Utc::now())],
        )?;
        tx.execute(
            "DELETE FROM cached_events WHERE source_id = ?",
            [source_id.as_str()],
        )?;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO cached_events
                    (source_id, position, uid, title, start_at, end_at, duration_hours)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ",
            )?;
            for (position, event) in events.iter().enumerate() {
                stmt.execute(params![
                    source_id.as_str(),
                    i64::try_from(position).unwrap_or(i64::MAX),
                    event.uid.as_ref().map(Uid::as_str),
                    event.title,
                    format_timestamp(event.start),
                    format_timestamp(event.end),
                    event.duration_hours(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn clear(&self, source_id: &SourceId) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = conn.execute(
            "DELETE FROM partitions WHERE source_id = ?",
            [source_id.as_str()],
        )?;
        Ok(removed > 0)
    }

    fn keys(&self) -> Result<Vec<SourceId>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare("SELECT source_id FROM partitions ORDER BY source_id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut keys = Vec::new();
        for row in rows {
            let raw = row?;
            let id = SourceId::new(raw.as_str()).map_err(|err| StoreError::Corrupt {
                source_id: raw,
                message: err.to_string(),
            })?;
            keys.push(id);
        }
        Ok(keys)
    }
}

fn event_from_row(
    source_id: &SourceId,
    uid: Option<String>,
    title: String,
    start_at: &str,
    end_at: &str,
) -> Result<Event, StoreError> {
    let corrupt = |message: String| StoreError::Corrupt {
        source_id: source_id.to_string(),
        message,
    };
    let start = parse_timestamp(start_at).map_err(&corrupt)?;
    let end = parse_timestamp(end_at).map_err(&corrupt)?;
    let uid = uid
        .map(Uid::new)
        .transpose()
        .map_err(|err| corrupt(err.to_string()))?;
    Event::new(uid, source_id.clone(), title, start, end).map_err(|err| corrupt(err.to_string()))
}

fn parse_timestamp(timestamp: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| format!("invalid timestamp {timestamp}: {err}"))
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
