//! Backup history persistence.
//!
//! Each public method is a single statement, so every lifecycle transition
//! lands as one atomic row write.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, ErrorCode, OptionalExtension, Row};

use crate::domain::{
    AppError, BackupRecord, BackupStatus, HistoryFilter, Result, SortDirection, SortField,
    StoredFile,
};

use super::database::{from_db_time, now, to_db_time, Database};

const SELECT_RECORD: &str = r"
    SELECT b.id, b.worker, b.started_at, b.ended_at, b.status,
           f.id, f.file_name, f.format, f.file_path, f.size
    FROM backup_histories b
    LEFT JOIN files f ON b.file_id = f.id
";

/// Position of the last row of a page in `(sort key, id)` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyset {
    /// Storage form of the sort key; ignored when sorting by id.
    pub key: String,
    pub id: i64,
}

impl Keyset {
    /// Position of `record` under `field`.
    #[must_use]
    pub fn of(record: &BackupRecord, field: SortField) -> Self {
        Self {
            key: sort_key(record, field),
            id: record.id,
        }
    }
}

/// Storage form of a record's sort key. An absent `ended_at` sorts lowest.
fn sort_key(record: &BackupRecord, field: SortField) -> String {
    match field {
        SortField::StartedAt => to_db_time(record.started_at),
        SortField::EndedAt => record.ended_at.map(to_db_time).unwrap_or_default(),
        SortField::Id => String::new(),
    }
}

const fn sort_expr(field: SortField) -> &'static str {
    match field {
        SortField::StartedAt => "b.started_at",
        SortField::EndedAt => "COALESCE(b.ended_at, '')",
        SortField::Id => "b.id",
    }
}

impl Database {
    /// Insert a new backup record stamped with the current time.
    ///
    /// Only `IN_PROGRESS` and `SKIPPED` are valid initial states. A second
    /// `IN_PROGRESS` row is rejected by a unique index and reported as
    /// [`AppError::AlreadyInProgress`].
    ///
    /// # Errors
    /// Returns error on an invalid initial status, a concurrent run, or a
    /// database failure.
    pub fn insert_backup(&self, worker: &str, status: BackupStatus) -> Result<BackupRecord> {
        if !matches!(status, BackupStatus::InProgress | BackupStatus::Skipped) {
            return Err(AppError::InvalidState {
                message: format!("A backup record cannot be created as {status}"),
            });
        }

        let started_at = now();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO backup_histories (worker, started_at, status) VALUES (?1, ?2, ?3)",
            params![worker, to_db_time(started_at), status.as_str()],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(ref f, _)
                if f.code == ErrorCode::ConstraintViolation
                    && status == BackupStatus::InProgress =>
            {
                AppError::AlreadyInProgress
            }
            other => AppError::database(other),
        })?;

        Ok(BackupRecord {
            id: conn.last_insert_rowid(),
            worker: worker.to_string(),
            started_at,
            ended_at: None,
            status,
            artifact: None,
        })
    }

    /// Move an `IN_PROGRESS` record to a terminal status, stamping `ended_at`.
    ///
    /// # Errors
    /// Returns [`AppError::RecordNotFound`] for an unknown id and
    /// [`AppError::InvalidState`] if the record already reached a terminal
    /// status or the target is not `COMPLETED`/`FAILED`.
    pub fn finish_backup(
        &self,
        id: i64,
        status: BackupStatus,
        artifact: Option<&StoredFile>,
    ) -> Result<BackupRecord> {
        if !matches!(status, BackupStatus::Completed | BackupStatus::Failed) {
            return Err(AppError::InvalidState {
                message: format!("A running backup cannot finish as {status}"),
            });
        }

        let updated = self
            .conn()?
            .execute(
                "UPDATE backup_histories SET status = ?1, ended_at = ?2, file_id = ?3
                 WHERE id = ?4 AND status = 'IN_PROGRESS'",
                params![
                    status.as_str(),
                    to_db_time(now()),
                    artifact.map(|f| f.id),
                    id
                ],
            )
            .map_err(AppError::database)?;

        let record = self.find_backup(id)?;
        if updated == 0 {
            return Err(AppError::InvalidState {
                message: format!("Backup {id} is already {}", record.status),
            });
        }

        Ok(record)
    }

    /// Load one record by id.
    ///
    /// # Errors
    /// Returns [`AppError::RecordNotFound`] if no record has this id.
    pub fn find_backup(&self, id: i64) -> Result<BackupRecord> {
        self.conn()?
            .query_row(
                &format!("{SELECT_RECORD} WHERE b.id = ?1"),
                [id],
                row_to_record,
            )
            .optional()
            .map_err(AppError::database)?
            .ok_or(AppError::RecordNotFound {
                entity: "BackupRecord",
                id,
            })
    }

    /// Number of records currently `IN_PROGRESS`.
    pub fn count_in_progress(&self) -> Result<u64> {
        self.conn()?
            .query_row(
                "SELECT COUNT(*) FROM backup_histories WHERE status = 'IN_PROGRESS'",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|c| c.unsigned_abs())
            .map_err(AppError::database)
    }

    /// Start time of the most recent `COMPLETED` record.
    pub fn latest_completed_started_at(&self) -> Result<Option<DateTime<Utc>>> {
        let latest: Option<String> = self
            .conn()?
            .query_row(
                "SELECT MAX(started_at) FROM backup_histories WHERE status = 'COMPLETED'",
                [],
                |row| row.get(0),
            )
            .map_err(AppError::database)?;

        latest
            .map(|s| from_db_time(&s))
            .transpose()
            .map_err(AppError::database)
    }

    /// Most recently started record with the given status.
    pub fn latest_backup_by_status(&self, status: BackupStatus) -> Result<Option<BackupRecord>> {
        self.conn()?
            .query_row(
                &format!(
                    "{SELECT_RECORD} WHERE b.status = ?1 ORDER BY b.started_at DESC, b.id DESC LIMIT 1"
                ),
                [status.as_str()],
                row_to_record,
            )
            .optional()
            .map_err(AppError::database)
    }

    /// Number of records matching the filters.
    pub fn count_backups(&self, filter: &HistoryFilter) -> Result<u64> {
        let (clauses, values) = filter_clauses(filter);
        let sql = format!(
            "SELECT COUNT(*) FROM backup_histories b {}",
            where_sql(&clauses)
        );

        self.conn()?
            .query_row(&sql, params_from_iter(values), |row| row.get::<_, i64>(0))
            .map(|c| c.unsigned_abs())
            .map_err(AppError::database)
    }

    /// Records matching the filters, ordered by `(field, id)`, strictly after
    /// `after` when given.
    pub fn query_backups(
        &self,
        filter: &HistoryFilter,
        after: Option<&Keyset>,
        field: SortField,
        direction: SortDirection,
        limit: usize,
    ) -> Result<Vec<BackupRecord>> {
        let (mut clauses, mut values) = filter_clauses(filter);
        let (cmp, dir) = match direction {
            SortDirection::Asc => (">", "ASC"),
            SortDirection::Desc => ("<", "DESC"),
        };
        let expr = sort_expr(field);

        if let Some(keyset) = after {
            if field == SortField::Id {
                values.push(Value::Integer(keyset.id));
                clauses.push(format!("b.id {cmp} ?{}", values.len()));
            } else {
                values.push(Value::Text(keyset.key.clone()));
                let k = values.len();
                values.push(Value::Integer(keyset.id));
                let i = values.len();
                clauses.push(format!(
                    "({expr} {cmp} ?{k} OR ({expr} = ?{k} AND b.id {cmp} ?{i}))"
                ));
            }
        }

        values.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        let order = if field == SortField::Id {
            format!("b.id {dir}")
        } else {
            format!("{expr} {dir}, b.id {dir}")
        };
        let sql = format!(
            "{SELECT_RECORD} {} ORDER BY {order} LIMIT ?{}",
            where_sql(&clauses),
            values.len()
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql).map_err(AppError::database)?;
        let rows = stmt
            .query_map(params_from_iter(values), row_to_record)
            .map_err(AppError::database)?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(AppError::database)
    }
}

/// WHERE fragments and positional values for the row filters.
fn filter_clauses(filter: &HistoryFilter) -> (Vec<String>, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    if let Some(worker) = filter.worker.as_deref().filter(|w| !w.is_empty()) {
        values.push(Value::Text(worker.to_string()));
        clauses.push(format!("instr(b.worker, ?{}) > 0", values.len()));
    }
    if let Some(status) = filter.status {
        values.push(Value::Text(status.as_str().to_string()));
        clauses.push(format!("b.status = ?{}", values.len()));
    }
    if let Some(from) = filter.started_at_from {
        values.push(Value::Text(to_db_time(from)));
        clauses.push(format!("b.started_at >= ?{}", values.len()));
    }
    if let Some(to) = filter.started_at_to {
        values.push(Value::Text(to_db_time(to)));
        clauses.push(format!("b.started_at <= ?{}", values.len()));
    }

    (clauses, values)
}

fn where_sql(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    }
}

fn row_to_record(row: &Row) -> rusqlite::Result<BackupRecord> {
    let started_at: String = row.get(2)?;
    let ended_at: Option<String> = row.get(3)?;
    let status: String = row.get(4)?;
    let status = status.parse::<BackupStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let artifact = match row.get::<_, Option<i64>>(5)? {
        Some(file_id) => Some(StoredFile {
            id: file_id,
            file_name: row.get(6)?,
            format: row.get(7)?,
            file_path: row.get(8)?,
            size: row.get::<_, i64>(9)?.unsigned_abs(),
        }),
        None => None,
    };

    Ok(BackupRecord {
        id: row.get(0)?,
        worker: row.get(1)?,
        started_at: from_db_time(&started_at)?,
        ended_at: ended_at.as_deref().map(from_db_time).transpose()?,
        status,
        artifact,
    })
}
