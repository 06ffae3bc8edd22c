//! Domain-level error types for hr-backup.
//!
//! All errors are typed with `thiserror`. The first five variants are the
//! orchestration taxonomy callers are expected to match on; the rest wrap
//! infrastructure failures with their source attached.

use thiserror::Error;

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    /// Another backup run currently holds `IN_PROGRESS`.
    #[error("A backup is already in progress")]
    AlreadyInProgress,

    /// Export or artifact write failed; the record has already been marked `FAILED`.
    #[error("Backup failed: {message}")]
    ExportFailed {
        message: String,
        #[source]
        source: Option<Box<Self>>,
    },

    /// A referenced backup record or stored file does not exist.
    #[error("{entity} not found: id={id}")]
    RecordNotFound { entity: &'static str, id: i64 },

    /// Malformed filter, sort or cursor parameters.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Lifecycle transition not allowed from the record's current status.
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Failed to open or query the database.
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// JSON encoding or decoding failed.
    #[error("JSON parse error: {message}")]
    JsonParse {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Configuration or environment error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO operation failed.
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl AppError {
    /// Create a database error from rusqlite error.
    pub fn database(err: rusqlite::Error) -> Self {
        Self::Database {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Create a JSON parse error.
    pub fn json_parse(err: serde_json::Error) -> Self {
        Self::JsonParse {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create an IO error with context.
    pub fn io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(err),
        }
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Wrap the error that aborted a backup run.
    pub fn export_failed(cause: Self) -> Self {
        Self::ExportFailed {
            message: cause.to_string(),
            source: Some(Box::new(cause)),
        }
    }

    /// Walk the `source()` chain, starting with this error.
    pub fn chain(&self) -> impl Iterator<Item = &(dyn std::error::Error + 'static)> {
        std::iter::successors(Some(self as &(dyn std::error::Error + 'static)), |e| {
            e.source()
        })
    }
}

/// Result type alias using `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
