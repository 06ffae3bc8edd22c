//! CLI interface using clap.
//!
//! Provides command-line arguments and subcommands for the tool.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};

use crate::application::OutputFormat;
use crate::domain::{AppError, BackupStatus, HistoryFilter, HistoryRequest, Result};

/// HR Backup - change-aware CSV snapshots of HR records.
///
/// Typical use: hr-backup init | run | daemon | history --status FAILED
#[derive(Parser, Debug)]
#[command(name = "hr-backup")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output format: table or json.
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,

    /// Configuration file (default: ~/.hr-backup/config.toml).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write the default configuration and create storage directories.
    Init,

    /// Run one backup now.
    Run {
        /// Address recorded as the requester of this backup.
        #[arg(short, long, default_value = "127.0.0.1")]
        worker: String,
    },

    /// Run backups on a fixed interval until interrupted.
    Daemon {
        /// Seconds between runs (overrides backup.interval_secs).
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Show the most recent backup with a given status.
    Latest {
        /// IN_PROGRESS, COMPLETED, FAILED or SKIPPED.
        #[arg(short, long, default_value = "COMPLETED")]
        status: String,
    },

    /// Show a single backup record.
    Show {
        /// Backup record id.
        id: i64,
    },

    /// Show a stored artifact, or copy it out with --output.
    File {
        /// Stored file id (from `show`).
        id: i64,

        /// Copy the file to this path.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List backup history, one page at a time.
    History {
        /// Worker substring.
        #[arg(long)]
        worker: Option<String>,

        /// Exact status.
        #[arg(long)]
        status: Option<String>,

        /// Earliest start time (RFC 3339 or YYYY-MM-DD), inclusive.
        #[arg(long)]
        from: Option<String>,

        /// Latest start time (RFC 3339 or YYYY-MM-DD), inclusive.
        #[arg(long)]
        to: Option<String>,

        /// Cursor printed with the previous page.
        #[arg(long)]
        cursor: Option<String>,

        /// Page size (1-100).
        #[arg(long, default_value = "10")]
        size: usize,

        /// startedAt, endedAt or id.
        #[arg(long, default_value = "startedAt")]
        sort_field: String,

        /// ASC or DESC.
        #[arg(long, default_value = "DESC")]
        sort_direction: String,
    },
}

impl Cli {
    /// Parse the output format argument.
    pub fn output_format(&self) -> std::result::Result<OutputFormat, String> {
        self.format.parse()
    }
}

/// Raw `history` arguments.
#[derive(Debug, Default)]
pub struct HistoryArgs<'a> {
    pub worker: Option<&'a str>,
    pub status: Option<&'a str>,
    pub from: Option<&'a str>,
    pub to: Option<&'a str>,
    pub cursor: Option<&'a str>,
    pub size: usize,
    pub sort_field: &'a str,
    pub sort_direction: &'a str,
}

impl HistoryArgs<'_> {
    /// Convert to a typed request. A bare date in `to` covers the whole day.
    ///
    /// # Errors
    /// Returns [`AppError::InvalidArgument`] for unparseable values.
    pub fn to_request(&self) -> Result<HistoryRequest> {
        Ok(HistoryRequest {
            filter: HistoryFilter {
                worker: self.worker.map(str::to_string),
                status: self.status.map(str::parse::<BackupStatus>).transpose()?,
                started_at_from: self.from.map(|s| parse_time(s, false)).transpose()?,
                started_at_to: self.to.map(|s| parse_time(s, true)).transpose()?,
            },
            cursor: self.cursor.map(str::to_string),
            size: self.size,
            sort_field: self.sort_field.parse()?,
            sort_direction: self.sort_direction.parse()?,
        })
    }
}

/// RFC 3339 timestamp, or a date taken as the start (or end) of that UTC day.
fn parse_time(s: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
        AppError::invalid_argument(format!("Invalid time: {s}. Use RFC 3339 or YYYY-MM-DD"))
    })?;
    let time = if end_of_day {
        date.and_hms_micro_opt(23, 59, 59, 999_999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };

    time.map(|t| t.and_utc())
        .ok_or_else(|| AppError::invalid_argument(format!("Invalid time: {s}")))
}
