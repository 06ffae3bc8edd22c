//! Domain layer - core business logic and types.
//!
//! This layer contains pure domain models, configuration, error types and
//! the collaborator traits, without any external dependencies (DB, IO, etc.).

pub mod config;
pub mod error;
pub mod models;
pub mod sources;

pub use config::AppConfig;
pub use error::{AppError, Result};
pub use models::{
    BackupRecord, BackupStatus, CursorPage, HistoryFilter, HistoryRequest, NewStoredFile,
    SortDirection, SortField, StoredFile,
};
pub use sources::{ChangeCounter, RowSource, SnapshotSource, SourceRow};
