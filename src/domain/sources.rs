//! Contracts the backup core needs from the HR records surface.
//!
//! The CRUD side of employees and departments lives elsewhere; backups only
//! read rows in id order and count change events.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::error::Result;

/// One source row, already rendered to text fields in header order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    /// Keyset position used to fetch the next batch.
    pub id: i64,
    pub fields: Vec<String>,
}

/// All rows of one exported entity, readable in ascending id batches.
pub trait RowSource: Send + Sync {
    /// Section name written as `## <NAME> ##` before the header.
    fn section(&self) -> &str;

    /// Column names, in the order of [`SourceRow::fields`].
    fn headers(&self) -> &[&str];

    /// Up to `limit` rows with id strictly greater than `after_id`, ascending.
    ///
    /// # Errors
    /// Returns error if the underlying store cannot be read.
    fn fetch_after(&self, after_id: Option<i64>, limit: usize) -> Result<Vec<SourceRow>>;
}

/// Opens the export sections over one consistent view of the dataset.
pub trait SnapshotSource: Send + Sync {
    /// Sections in file order. They all read the same point in time until
    /// every returned source is dropped.
    ///
    /// # Errors
    /// Returns error if the view cannot be opened.
    fn open_snapshot(&self) -> Result<Vec<Arc<dyn RowSource>>>;
}

/// Fixed sections, read as they are.
impl SnapshotSource for Vec<Arc<dyn RowSource>> {
    fn open_snapshot(&self) -> Result<Vec<Arc<dyn RowSource>>> {
        Ok(self.clone())
    }
}

/// Counter over recorded mutations of the business dataset.
pub trait ChangeCounter: Send + Sync {
    /// Number of change events with event time at or after `since`.
    ///
    /// # Errors
    /// Returns error if the underlying store cannot be read.
    fn count_changes_since(&self, since: DateTime<Utc>) -> Result<u64>;
}
