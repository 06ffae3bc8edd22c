//! Filesystem storage for snapshot artifacts and error logs.
//!
//! Never touches the database; metadata rows are the caller's business.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::domain::{AppError, Result};

/// Byte-order mark so spreadsheet tools detect UTF-8.
const BOM: &str = "\u{FEFF}";

/// Lexicographically sortable, microsecond-unique file timestamp.
const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

/// A snapshot that could not be completed.
#[derive(Debug)]
pub struct PersistFailure {
    /// File created before the failure, if any; may hold partial content.
    pub partial: Option<PathBuf>,
    pub error: AppError,
}

/// Writes artifacts under two directories: snapshots and error logs.
#[derive(Debug, Clone)]
pub struct FileStore {
    backups_dir: PathBuf,
    error_logs_dir: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(backups_dir: impl Into<PathBuf>, error_logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            backups_dir: backups_dir.into(),
            error_logs_dir: error_logs_dir.into(),
        }
    }

    #[must_use]
    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    #[must_use]
    pub fn error_logs_dir(&self) -> &Path {
        &self.error_logs_dir
    }

    /// Write `lines` to a new `backup_<timestamp>.csv`, BOM first, one
    /// `\n`-terminated line per item, in order.
    ///
    /// The first `Err` item aborts the write. The file handle is released
    /// before returning either way.
    ///
    /// # Errors
    /// Returns the failure and the path of any partially written file.
    pub fn persist<I>(&self, lines: I) -> std::result::Result<PathBuf, PersistFailure>
    where
        I: IntoIterator<Item = Result<String>>,
    {
        let no_file = |error| PersistFailure {
            partial: None,
            error,
        };

        ensure_dir(&self.backups_dir).map_err(no_file)?;
        let path = self
            .backups_dir
            .join(format!("backup_{}.csv", file_timestamp()));
        let file = create_new(&path).map_err(no_file)?;

        match write_lines(file, &path, lines) {
            Ok(count) => {
                tracing::info!(path = %path.display(), lines = count, "Backup file written");
                Ok(path)
            }
            Err(error) => Err(PersistFailure {
                partial: Some(path),
                error,
            }),
        }
    }

    /// Write a human-readable dump of `error` to `error_log_<timestamp>.log`.
    ///
    /// `context` lines (key, value) are written between the message and the
    /// cause chain. Returns `None` if the log itself cannot be written; that
    /// failure is logged, not propagated.
    #[must_use]
    pub fn write_error_log(&self, error: &AppError, context: &[(&str, String)]) -> Option<PathBuf> {
        let path = self
            .error_logs_dir
            .join(format!("error_log_{}.log", file_timestamp()));

        let result = ensure_dir(&self.error_logs_dir)
            .and_then(|()| create_new(&path))
            .and_then(|file| {
                write_error_dump(file, error, context)
                    .map_err(|e| AppError::io("Failed to write error log", e))
            });

        match result {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Error log saved");
                Some(path)
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to save error log");
                None
            }
        }
    }

    /// Remove a file. Returns `false` if it was already absent.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be removed.
    pub fn delete(&self, path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "File deleted");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "File already absent");
                Ok(false)
            }
            Err(e) => Err(AppError::io(
                format!("Failed to delete {}", path.display()),
                e,
            )),
        }
    }
}

fn file_timestamp() -> String {
    Utc::now().format(FILE_TIMESTAMP_FORMAT).to_string()
}

/// Create a directory and its parents; no-op if it exists.
fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        fs::create_dir_all(dir)
            .map_err(|e| AppError::io(format!("Failed to create directory {}", dir.display()), e))?;
        tracing::info!(path = %dir.display(), "Directory created");
    }
    Ok(())
}

fn create_new(path: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| AppError::io(format!("Failed to create {}", path.display()), e))
}

fn write_lines<I>(file: File, path: &Path, lines: I) -> Result<usize>
where
    I: IntoIterator<Item = Result<String>>,
{
    let mut writer = BufWriter::new(file);
    let write_err = |e| AppError::io(format!("Failed to write {}", path.display()), e);

    writer.write_all(BOM.as_bytes()).map_err(write_err)?;

    let mut count = 0;
    for line in lines {
        let line = line?;
        writer.write_all(line.as_bytes()).map_err(write_err)?;
        writer.write_all(b"\n").map_err(write_err)?;
        count += 1;
    }

    let file = writer
        .into_inner()
        .map_err(|e| write_err(e.into_error()))?;
    file.sync_all().map_err(write_err)?;

    Ok(count)
}

fn write_error_dump(file: File, error: &AppError, context: &[(&str, String)]) -> std::io::Result<()> {
    let mut w = BufWriter::new(file);

    writeln!(w, "ERROR backup failed: {}", Utc::now().to_rfc3339())?;
    writeln!(w, "message: {error}")?;
    for (key, value) in context {
        writeln!(w, "{key}: {value}")?;
    }
    for (depth, cause) in error.chain().skip(1).enumerate() {
        writeln!(w, "caused by [{depth}]: {cause}")?;
    }
    writeln!(w, "debug: {error:?}")?;

    w.into_inner().map_err(std::io::IntoInnerError::into_error)?.sync_all()
}
