//! Read side of the HR records tables.
//!
//! Provides the export row sources for employees and departments and the
//! change-event counter over `change_logs`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::domain::{AppError, ChangeCounter, Result, RowSource, SnapshotSource, SourceRow};

use super::database::{to_db_time, Database, BUSY_TIMEOUT};

const EMPLOYEE_HEADERS: &[&str] = &[
    "ID",
    "Name",
    "Email",
    "EmployeeNumber",
    "Department",
    "Position",
    "HireDate",
    "Status",
    "CreatedAt",
];

const DEPARTMENT_HEADERS: &[&str] = &["ID", "Name", "Description", "EstablishedDate", "CreatedAt"];

/// Opens a [`Snapshot`] of the HR tables for each export.
pub struct HrSnapshots {
    path: PathBuf,
}

impl HrSnapshots {
    /// Snapshots of the database file behind `db`.
    #[must_use]
    pub fn new(db: &Database) -> Self {
        Self {
            path: db.path().to_path_buf(),
        }
    }
}

impl SnapshotSource for HrSnapshots {
    fn open_snapshot(&self) -> Result<Vec<Arc<dyn RowSource>>> {
        let snapshot = Arc::new(Snapshot::open(&self.path)?);
        Ok(vec![
            Arc::new(EmployeeRows::new(Arc::clone(&snapshot))),
            Arc::new(DepartmentRows::new(snapshot)),
        ])
    }
}

/// A query-only connection holding one read transaction.
///
/// Every batch read through it sees the tables as of [`Snapshot::open`],
/// whatever the CRUD side commits meanwhile. The transaction ends when the
/// connection is dropped.
pub struct Snapshot {
    conn: Mutex<Connection>,
}

impl Snapshot {
    /// Open a connection and pin its read point.
    ///
    /// # Errors
    /// Returns error if the database cannot be opened or read.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(AppError::database)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(AppError::database)?;
        conn.execute_batch("PRAGMA query_only = ON; BEGIN DEFERRED;")
            .map_err(AppError::database)?;

        // A deferred transaction takes its snapshot at the first read
        conn.query_row("SELECT COUNT(*) FROM departments", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(AppError::database)?;

        tracing::debug!(path = %path.display(), "Export snapshot opened");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run a keyset batch query whose first column is the integer id.
    fn fetch_batch(
        &self,
        sql: &str,
        after_id: Option<i64>,
        limit: usize,
        columns: usize,
    ) -> Result<Vec<SourceRow>> {
        let conn = self.conn.lock().map_err(|_| AppError::Database {
            message: "Snapshot connection lock poisoned".into(),
            source: None,
        })?;
        let mut stmt = conn.prepare_cached(sql).map_err(AppError::database)?;

        let rows = stmt
            .query_map(
                params![
                    after_id.unwrap_or(i64::MIN),
                    i64::try_from(limit).unwrap_or(i64::MAX)
                ],
                |row| row_to_source(row, columns),
            )
            .map_err(AppError::database)?;

        let batch = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(AppError::database)?;

        tracing::trace!(rows = batch.len(), ?after_id, "Fetched export batch");

        Ok(batch)
    }
}

/// Employees with their department resolved to its name.
pub struct EmployeeRows {
    snapshot: Arc<Snapshot>,
}

/// Departments.
pub struct DepartmentRows {
    snapshot: Arc<Snapshot>,
}

impl EmployeeRows {
    #[must_use]
    pub const fn new(snapshot: Arc<Snapshot>) -> Self {
        Self { snapshot }
    }
}

impl DepartmentRows {
    #[must_use]
    pub const fn new(snapshot: Arc<Snapshot>) -> Self {
        Self { snapshot }
    }
}

impl RowSource for EmployeeRows {
    fn section(&self) -> &str {
        "EMPLOYEES"
    }

    fn headers(&self) -> &[&str] {
        EMPLOYEE_HEADERS
    }

    fn fetch_after(&self, after_id: Option<i64>, limit: usize) -> Result<Vec<SourceRow>> {
        self.snapshot.fetch_batch(
            r"
            SELECT e.id, e.name, e.email, e.employee_number, COALESCE(d.name, ''),
                   e.position, e.hire_date, e.status, e.created_at
            FROM employees e
            LEFT JOIN departments d ON e.department_id = d.id
            WHERE e.id > ?1
            ORDER BY e.id
            LIMIT ?2
            ",
            after_id,
            limit,
            EMPLOYEE_HEADERS.len(),
        )
    }
}

impl RowSource for DepartmentRows {
    fn section(&self) -> &str {
        "DEPARTMENTS"
    }

    fn headers(&self) -> &[&str] {
        DEPARTMENT_HEADERS
    }

    fn fetch_after(&self, after_id: Option<i64>, limit: usize) -> Result<Vec<SourceRow>> {
        self.snapshot.fetch_batch(
            r"
            SELECT id, name, COALESCE(description, ''), established_date, created_at
            FROM departments
            WHERE id > ?1
            ORDER BY id
            LIMIT ?2
            ",
            after_id,
            limit,
            DEPARTMENT_HEADERS.len(),
        )
    }
}

/// Render every column as text; NULL becomes an empty field.
fn row_to_source(row: &Row, columns: usize) -> rusqlite::Result<SourceRow> {
    let id: i64 = row.get(0)?;
    let mut fields = Vec::with_capacity(columns);
    fields.push(id.to_string());
    for i in 1..columns {
        let value: Option<String> = row.get(i)?;
        fields.push(value.unwrap_or_default());
    }

    Ok(SourceRow { id, fields })
}

impl ChangeCounter for Database {
    fn count_changes_since(&self, since: DateTime<Utc>) -> Result<u64> {
        self.conn()?
            .query_row(
                "SELECT COUNT(*) FROM change_logs WHERE created_at >= ?1",
                [to_db_time(since)],
                |row| row.get::<_, i64>(0),
            )
            .map(|c| c.unsigned_abs())
            .map_err(AppError::database)
    }
}

/// Collaborator-side writes, used to build fixtures.
#[cfg(test)]
impl Database {
    pub fn insert_department(&self, name: &str, description: Option<&str>) -> i64 {
        let conn = self.conn().unwrap();
        conn.execute(
            "INSERT INTO departments (name, description, established_date, created_at)
             VALUES (?1, ?2, '2020-03-01', ?3)",
            params![name, description, to_db_time(Utc::now())],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    pub fn insert_employee(&self, name: &str, email: &str, department_id: Option<i64>) -> i64 {
        let conn = self.conn().unwrap();
        let next: i64 = conn
            .query_row("SELECT COUNT(*) + 1 FROM employees", [], |row| row.get(0))
            .unwrap();
        conn.execute(
            "INSERT INTO employees
                (name, email, employee_number, department_id, position, hire_date, created_at)
             VALUES (?1, ?2, ?3, ?4, 'Engineer', '2024-01-15', ?5)",
            params![
                name,
                email,
                format!("EMP-2024-{next:03}"),
                department_id,
                to_db_time(Utc::now())
            ],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    pub fn record_change_at(&self, at: DateTime<Utc>) {
        self.conn()
            .unwrap()
            .execute(
                "INSERT INTO change_logs (change_type, created_at) VALUES ('UPDATED', ?1)",
                [to_db_time(at)],
            )
            .unwrap();
    }

    pub fn record_change(&self) {
        self.record_change_at(Utc::now());
    }
}
