//! SQLite persistence layer: the accounting snapshot store.
//!
//! RULE: Only the store talks to the database.
//! Reports call store methods; they never execute SQL directly.
//! Every read is a plain snapshot query; nothing here writes outside the
//! insert helpers used to load fixtures.

use crate::error::{ReportError, ReportResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::Connection;
use std::time::Instant;

mod jobs;
mod storage;
mod topology;

/// Store timestamp format: UTC, second resolution.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct ReportStore {
    conn: Connection,
}

impl ReportStore {
    pub fn open(path: &str) -> ReportResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> ReportResult<Self> {
        let conn = Connection::open(":memory:")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> ReportResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_accounting.sql"))?;
        Ok(())
    }

    /// Run one named read and log how long it took.
    fn timed<T>(&self, name: &str, query: impl FnOnce(&Connection) -> ReportResult<T>) -> ReportResult<T> {
        let started = Instant::now();
        let result = query(&self.conn);
        log::info!("Query {name} took {:.2} seconds.", started.elapsed().as_secs_f64());
        result
    }
}

// ── Timestamp helpers ─────────────────────────────────────────────

pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> ReportResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| ReportError::InvalidTimestamp { value: s.to_string() })
}

/// `[day 00:00, day+1 00:00)` as store text.
fn day_bounds(day: NaiveDate) -> (String, String) {
    let start = day.and_hms_opt(0, 0, 0).unwrap_or_default();
    let end = start + chrono::Duration::days(1);
    (
        start.format(TIMESTAMP_FORMAT).to_string(),
        end.format(TIMESTAMP_FORMAT).to_string(),
    )
}

/// Sqlite integers are signed; negative metrics are treated as unknown.
fn metric(v: Option<i64>) -> Option<u64> {
    v.and_then(|v| u64::try_from(v).ok())
}

// ── Row structs ───────────────────────────────────────────────────

/// One topology row for a storage entity.
#[derive(Debug, Clone)]
pub struct StorageElementRow {
    pub unique_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    /// The root SE this entity belongs to.
    pub se: String,
    pub space_type: String,
    pub implementation: Option<String>,
    pub version: Option<String>,
    pub site_name: Option<String>,
    pub status: String,
    pub probe_name: String,
    /// `None` for topology rows the probe never timestamped.
    pub timestamp: Option<DateTime<Utc>>,
}

/// One space measurement for a storage entity.
#[derive(Debug, Clone)]
pub struct SpaceRecordRow {
    pub unique_id: String,
    pub measurement_type: Option<String>,
    pub total_space: Option<i64>,
    pub free_space: Option<i64>,
    pub used_space: Option<i64>,
    pub file_count: Option<i64>,
    pub file_count_limit: Option<i64>,
    pub probe_name: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ComputeElementRow {
    pub unique_id: String,
    pub host_name: String,
    pub site_name: String,
    pub probe_name: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct JobRow {
    pub local_job_id: String,
    pub common_name: Option<String>,
    pub host: Option<String>,
    pub host_description: Option<String>,
    pub resource_type: String,
    pub probe_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub wall_duration: f64,
    pub cpu_user_duration: f64,
    pub cpu_system_duration: f64,
    pub exit_code: Option<i64>,
    pub app_info: Option<String>,
}

/// A site-defined command whose output the storage report appends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomCommandRow {
    pub job_name: String,
    pub se_unique_id: String,
    /// Element of `extra_xml` that holds the command output.
    pub tag_name: String,
    pub extra_xml: String,
    pub end_time: DateTime<Utc>,
}
