//! Domain models for backup records and stored files.
//!
//! These models represent the two entities the backup subsystem owns, plus the
//! parameter and page types of the history query surface.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::AppError;

/// Lifecycle status of a backup run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupStatus {
    /// Export is running; at most one record may hold this status.
    InProgress,
    /// Snapshot written and referenced.
    Completed,
    /// Run aborted; artifact is the error log when one could be written.
    Failed,
    /// Nothing changed since the last completed snapshot.
    Skipped,
}

impl BackupStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
        }
    }

    /// Whether no further transition is allowed.
    #[cfg(test)]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl std::fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackupStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "SKIPPED" => Ok(Self::Skipped),
            _ => Err(AppError::invalid_argument(format!(
                "Unknown backup status: {s}. Use: IN_PROGRESS, COMPLETED, FAILED, SKIPPED"
            ))),
        }
    }
}

/// A file persisted on disk and described in the `files` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub id: i64,
    pub file_name: String,
    /// Upper-cased extension, empty if the name has none.
    pub format: String,
    pub file_path: String,
    /// Size in bytes at the time the row was created.
    pub size: u64,
}

/// Metadata for a file that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStoredFile {
    pub file_name: String,
    pub format: String,
    pub file_path: String,
    pub size: u64,
}

impl NewStoredFile {
    /// Describe a file on disk, reading its size from the filesystem.
    ///
    /// # Errors
    /// Returns error if the file does not exist or cannot be inspected.
    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| AppError::io(format!("File does not exist: {}", path.display()), e))?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            format: format_of(&file_name),
            file_name,
            file_path: path.to_string_lossy().into_owned(),
            size: metadata.len(),
        })
    }
}

/// Upper-cased extension after the last dot; a leading dot does not count.
fn format_of(file_name: &str) -> String {
    match file_name.rfind('.') {
        Some(i) if i > 0 => file_name[i + 1..].to_uppercase(),
        _ => String::new(),
    }
}

/// One row per backup attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    pub id: i64,
    /// "system" for scheduled runs, the caller's address for on-demand runs.
    pub worker: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: BackupStatus,
    /// Snapshot on success, error log on failure, absent on skip.
    pub artifact: Option<StoredFile>,
}

impl BackupRecord {
    /// Duration of the run, if it has ended.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.ended_at.map(|end| end - self.started_at)
    }
}

/// Column the history is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortField {
    #[default]
    #[serde(rename = "startedAt")]
    StartedAt,
    #[serde(rename = "endedAt")]
    EndedAt,
    #[serde(rename = "id")]
    Id,
}

impl std::str::FromStr for SortField {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "startedAt" | "startAt" | "started_at" => Ok(Self::StartedAt),
            "endedAt" | "endAt" | "ended_at" => Ok(Self::EndedAt),
            "id" => Ok(Self::Id),
            _ => Err(AppError::invalid_argument(format!(
                "Unknown sort field: {s}. Use: startedAt, endedAt, id"
            ))),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl std::str::FromStr for SortDirection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            _ => Err(AppError::invalid_argument(format!(
                "Unknown sort direction: {s}. Use: ASC, DESC"
            ))),
        }
    }
}

/// Row filters for the history query. `None` means "no constraint".
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Substring match on worker.
    pub worker: Option<String>,
    pub status: Option<BackupStatus>,
    /// Inclusive lower bound on `started_at`.
    pub started_at_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `started_at`.
    pub started_at_to: Option<DateTime<Utc>>,
}

/// A full history page request.
#[derive(Debug, Clone)]
pub struct HistoryRequest {
    pub filter: HistoryFilter,
    /// Token from a previous page's `next_cursor`.
    pub cursor: Option<String>,
    pub size: usize,
    pub sort_field: SortField,
    pub sort_direction: SortDirection,
}

impl Default for HistoryRequest {
    fn default() -> Self {
        Self {
            filter: HistoryFilter::default(),
            cursor: None,
            size: 10,
            sort_field: SortField::default(),
            sort_direction: SortDirection::default(),
        }
    }
}

/// One page of a cursor-paginated result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPage<T> {
    pub content: Vec<T>,
    pub next_cursor: Option<String>,
    pub next_id_after: Option<i64>,
    pub size: usize,
    /// Rows matching the filters, ignoring the cursor.
    pub total_elements: u64,
    pub has_next: bool,
}
