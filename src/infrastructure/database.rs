//! SQLite database for HR records and backup bookkeeping.
//!
//! Owns the schema for the two backup entities (`backup_histories`, `files`)
//! and the collaborator tables the exporter reads (`departments`,
//! `employees`, `change_logs`). Repository methods live in sibling modules as
//! further `impl Database` blocks.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

use crate::domain::{AppError, Result};

/// How long a writer waits on a lock held by another connection.
pub(crate) const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared database handle.
///
/// The connection sits behind a mutex so the handle can be shared across the
/// scheduler and query threads. Every repository call locks for exactly one
/// statement, which keeps each row write atomic.
pub struct Database {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl Database {
    /// Opens or creates the database.
    ///
    /// # Errors
    /// Returns error if database cannot be opened or schema creation fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::io("Failed to create database directory", e))?;
        }

        let conn = Connection::open(path).map_err(AppError::database)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(AppError::database)?;

        // WAL lets history queries read while a run is writing
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(AppError::database)?;

        let db = Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        };
        db.init_schema()?;

        tracing::debug!(path = %path.display(), "Database opened");

        Ok(db)
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                r"
            -- Stored file metadata
            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_name TEXT NOT NULL,
                format TEXT NOT NULL DEFAULT '',
                file_path TEXT NOT NULL,
                size INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            -- One row per backup attempt
            CREATE TABLE IF NOT EXISTS backup_histories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                worker TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                status TEXT NOT NULL
                    CHECK (status IN ('IN_PROGRESS', 'COMPLETED', 'FAILED', 'SKIPPED')),
                file_id INTEGER REFERENCES files(id) ON DELETE SET NULL
            );

            -- At most one running backup across every connection
            CREATE UNIQUE INDEX IF NOT EXISTS idx_backup_single_in_progress
                ON backup_histories(status) WHERE status = 'IN_PROGRESS';

            CREATE INDEX IF NOT EXISTS idx_backup_started
                ON backup_histories(started_at, id);
            CREATE INDEX IF NOT EXISTS idx_backup_status_started
                ON backup_histories(status, started_at);

            -- Collaborator tables (written by the CRUD surface)
            CREATE TABLE IF NOT EXISTS departments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT,
                established_date TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS employees (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                employee_number TEXT NOT NULL,
                department_id INTEGER REFERENCES departments(id),
                position TEXT NOT NULL,
                hire_date TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'ACTIVE',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS change_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                employee_id INTEGER,
                change_type TEXT NOT NULL,
                memo TEXT,
                ip_address TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_change_logs_created
                ON change_logs(created_at);
            ",
            )
            .map_err(AppError::database)?;

        Ok(())
    }

    /// File this handle was opened on.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lock the connection for one statement.
    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| AppError::Database {
            message: "Database connection lock poisoned".into(),
            source: None,
        })
    }
}

/// Format a timestamp for storage.
///
/// Fixed microsecond precision keeps lexicographic and chronological order
/// identical, which the range filters and cursors rely on.
pub(crate) fn to_db_time(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
pub(crate) fn from_db_time(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Current time truncated to storage precision.
///
/// Values handed back to callers then compare equal to what a later read
/// returns.
pub(crate) fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}
