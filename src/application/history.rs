//! Read-only queries over backup history.
//!
//! Pagination is keyset based: the cursor carries the sort key and id of the
//! last returned row, so pages stay stable while new records are inserted.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    AppError, BackupRecord, BackupStatus, CursorPage, HistoryRequest, Result, SortField,
    StoredFile,
};
use crate::infrastructure::database::to_db_time;
use crate::infrastructure::{Database, Keyset};

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: usize = 100;

/// Decoded form of a pagination token.
#[derive(Debug, Serialize, Deserialize)]
struct CursorToken {
    field: SortField,
    key: Option<String>,
    id: i64,
}

/// History query service.
pub struct HistoryQuery {
    db: Arc<Database>,
}

impl HistoryQuery {
    #[must_use]
    pub const fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Most recent record with `status`, by `started_at`.
    ///
    /// # Errors
    /// Returns error if the database query fails.
    pub fn latest_by_status(&self, status: BackupStatus) -> Result<Option<BackupRecord>> {
        self.db.latest_backup_by_status(status)
    }

    /// # Errors
    /// Returns [`AppError::RecordNotFound`] for an unknown id.
    pub fn find_backup(&self, id: i64) -> Result<BackupRecord> {
        self.db.find_backup(id)
    }

    /// Metadata of a stored artifact (snapshot or error log).
    ///
    /// # Errors
    /// Returns [`AppError::RecordNotFound`] for an unknown id.
    pub fn find_file(&self, id: i64) -> Result<StoredFile> {
        self.db.find_stored_file(id)
    }

    /// One page of history, ordered by the requested field with id as tie-break.
    ///
    /// # Errors
    /// Returns [`AppError::InvalidArgument`] for a bad size, an inverted time
    /// range, or a cursor that is malformed or was minted for another sort field.
    pub fn list_history(&self, request: &HistoryRequest) -> Result<CursorPage<BackupRecord>> {
        validate(request)?;

        let field = request.sort_field;
        let after = request
            .cursor
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(|c| decode_cursor(c, field))
            .transpose()?;

        let mut content = self.db.query_backups(
            &request.filter,
            after.as_ref(),
            field,
            request.sort_direction,
            request.size + 1,
        )?;

        let has_next = content.len() > request.size;
        content.truncate(request.size);

        let next = if has_next {
            content.last().map(|last| Keyset::of(last, field))
        } else {
            None
        };
        let next_cursor = next.as_ref().map(|k| encode_cursor(field, k)).transpose()?;
        let total_elements = self.db.count_backups(&request.filter)?;

        tracing::debug!(
            returned = content.len(),
            total_elements,
            has_next,
            "History page loaded"
        );

        Ok(CursorPage {
            content,
            next_cursor,
            next_id_after: next.map(|k| k.id),
            size: request.size,
            total_elements,
            has_next,
        })
    }
}

fn validate(request: &HistoryRequest) -> Result<()> {
    if !(1..=MAX_PAGE_SIZE).contains(&request.size) {
        return Err(AppError::invalid_argument(format!(
            "Page size must be between 1 and {MAX_PAGE_SIZE}, got {}",
            request.size
        )));
    }

    if let (Some(from), Some(to)) = (
        request.filter.started_at_from,
        request.filter.started_at_to,
    ) {
        if from > to {
            return Err(AppError::invalid_argument(format!(
                "started_at_from ({from}) is after started_at_to ({to})"
            )));
        }
    }

    Ok(())
}

fn encode_cursor(field: SortField, keyset: &Keyset) -> Result<String> {
    let token = CursorToken {
        field,
        key: (field != SortField::Id).then(|| keyset.key.clone()),
        id: keyset.id,
    };
    let json = serde_json::to_vec(&token).map_err(AppError::json_parse)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_cursor(cursor: &str, field: SortField) -> Result<Keyset> {
    let invalid = || AppError::invalid_argument(format!("Invalid cursor: {cursor}"));

    let bytes = URL_SAFE_NO_PAD.decode(cursor).map_err(|_| invalid())?;
    let token: CursorToken = serde_json::from_slice(&bytes).map_err(|_| invalid())?;

    if token.field != field {
        return Err(AppError::invalid_argument(format!(
            "Cursor was issued for a different sort field ({:?}, requested {field:?})",
            token.field
        )));
    }

    let key = match (field, token.key.as_deref()) {
        (SortField::Id, _) => String::new(),
        // Records still running have no end time and sort lowest.
        (SortField::EndedAt, Some("")) => String::new(),
        (_, Some(key)) => storage_time(key).ok_or_else(invalid)?,
        (_, None) => return Err(invalid()),
    };

    Ok(Keyset { key, id: token.id })
}

/// Storage form of an RFC 3339 key, so any offset or precision compares
/// correctly against stored values. Sub-microsecond keys have no storage form.
fn storage_time(key: &str) -> Option<String> {
    let dt = DateTime::parse_from_rfc3339(key).ok()?.with_timezone(&Utc);
    (dt.timestamp_subsec_nanos() % 1_000 == 0).then(|| to_db_time(dt))
}
