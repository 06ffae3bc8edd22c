//! Output formatting for backup records.
//!
//! Supports two output formats: table view and JSON.

use colored::{ColoredString, Colorize};
use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;

use crate::domain::{BackupRecord, BackupStatus, CursorPage, StoredFile};

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable tables.
    #[default]
    Table,
    /// JSON format for programmatic use.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {s}. Use: table, json")),
        }
    }
}

/// Pretty JSON for any serializable value.
///
/// # Errors
/// Returns error if serialization fails.
pub fn format_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

/// One-line summary of a finished trigger.
pub fn format_run_result(record: &BackupRecord) -> String {
    match (&record.status, &record.artifact) {
        (BackupStatus::Completed, Some(file)) => format!(
            "{} Backup #{} completed: {} ({})",
            "✓".green().bold(),
            record.id,
            file.file_path,
            format_size(file.size)
        ),
        (BackupStatus::Skipped, _) => format!(
            "{} Backup #{} skipped: no changes since the last completed backup",
            "↷".yellow().bold(),
            record.id
        ),
        _ => format!("Backup #{} is {}", record.id, colored_status(record.status)),
    }
}

/// Detailed view of a single record.
pub fn format_record_detail(record: &BackupRecord) -> String {
    let mut out = format!("{}\n", format!("Backup #{}", record.id).bold());

    out.push_str(&format!("  Status:   {}\n", colored_status(record.status)));
    out.push_str(&format!("  Worker:   {}\n", record.worker));
    out.push_str(&format!(
        "  Started:  {}\n",
        record.started_at.format("%Y-%m-%d %H:%M:%S%.6f UTC")
    ));
    if let Some(ended) = record.ended_at {
        out.push_str(&format!(
            "  Ended:    {}\n",
            ended.format("%Y-%m-%d %H:%M:%S%.6f UTC")
        ));
    }
    if let Some(duration) = record.duration() {
        out.push_str(&format!(
            "  Duration: {} ms\n",
            duration.num_milliseconds()
        ));
    }

    match &record.artifact {
        Some(file) => {
            out.push_str(&format!(
                "  File:     {} ({}, {})\n",
                file.file_name.cyan(),
                file.format,
                format_size(file.size)
            ));
            out.push_str(&format!("  Path:     {}", file.file_path));
        }
        None => out.push_str("  File:     -"),
    }

    out
}

/// Detailed view of a stored artifact.
pub fn format_stored_file(file: &StoredFile) -> String {
    format!(
        "{}\n  Name:   {}\n  Format: {}\n  Size:   {}\n  Path:   {}",
        format!("File #{}", file.id).bold(),
        file.file_name.cyan(),
        file.format,
        format_size(file.size),
        file.file_path
    )
}

/// Table listing of records.
pub fn format_records_table(records: &[BackupRecord]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["ID", "Worker", "Started", "Ended", "Status", "File", "Size"]);

    for record in records {
        let ended = record.ended_at.map_or_else(
            || "-".to_string(),
            |dt| dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        );
        let (file, size) = record.artifact.as_ref().map_or_else(
            || ("-".to_string(), "-".to_string()),
            |f| (truncate(&f.file_name, 40), format_size(f.size)),
        );

        table.add_row(vec![
            record.id.to_string(),
            truncate(&record.worker, 20),
            record.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            ended,
            record.status.to_string(),
            file,
            size,
        ]);
    }

    table.to_string()
}

/// Table of one history page followed by the paging footer.
pub fn format_page_table(page: &CursorPage<BackupRecord>) -> String {
    let mut out = format_records_table(&page.content);

    out.push_str(&format!(
        "\n{} of {} record(s)",
        page.content.len().to_string().cyan(),
        page.total_elements.to_string().cyan()
    ));
    if let Some(cursor) = &page.next_cursor {
        out.push_str(&format!("\nNext page: --cursor {}", cursor.yellow()));
    }

    out
}

fn colored_status(status: BackupStatus) -> ColoredString {
    match status {
        BackupStatus::InProgress => status.as_str().blue(),
        BackupStatus::Completed => status.as_str().green(),
        BackupStatus::Failed => status.as_str().red(),
        BackupStatus::Skipped => status.as_str().yellow(),
    }
}

/// Byte count in the largest whole unit.
#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

/// Truncates a string to max length with ellipsis.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(status: BackupStatus, with_file: bool) -> BackupRecord {
        let started_at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        BackupRecord {
            id: 7,
            worker: "10.0.0.5".into(),
            started_at,
            ended_at: status
                .is_terminal()
                .then(|| started_at + chrono::Duration::milliseconds(1500)),
            status,
            artifact: with_file.then(|| StoredFile {
                id: 3,
                file_name: "backup_20260301_090000_000000.csv".into(),
                format: "CSV".into(),
                file_path: "/data/backups/backup_20260301_090000_000000.csv".into(),
                size: 2048,
            }),
        }
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world!", 8), "hello...");
        assert_eq!(truncate("인사부서관리팀", 6), "인사부...");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("table".parse::<OutputFormat>(), Ok(OutputFormat::Table));
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert!("markdown".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_records_table_contains_fields() {
        let table = format_records_table(&[
            record(BackupStatus::Completed, true),
            record(BackupStatus::Skipped, false),
        ]);

        assert!(table.contains("10.0.0.5"));
        assert!(table.contains("COMPLETED"));
        assert!(table.contains("SKIPPED"));
        assert!(table.contains("2.0 KB"));
    }

    #[test]
    fn test_page_footer_shows_cursor() {
        let page = CursorPage {
            content: vec![record(BackupStatus::Failed, false)],
            next_cursor: Some("eyJpZCI6N30".into()),
            next_id_after: Some(7),
            size: 1,
            total_elements: 4,
            has_next: true,
        };

        let out = format_page_table(&page);
        assert!(out.contains("of"));
        assert!(out.contains("eyJpZCI6N30"));
    }

    #[test]
    fn test_json_uses_wire_names() {
        let page = CursorPage {
            content: vec![record(BackupStatus::InProgress, false)],
            next_cursor: None,
            next_id_after: None,
            size: 10,
            total_elements: 1,
            has_next: false,
        };

        let json = format_json(&page).unwrap();
        assert!(json.contains("\"totalElements\": 1"));
        assert!(json.contains("\"hasNext\": false"));
        assert!(json.contains("\"IN_PROGRESS\""));
    }

    #[test]
    fn test_run_result_lines() {
        assert!(format_run_result(&record(BackupStatus::Completed, true)).contains("completed"));
        assert!(format_run_result(&record(BackupStatus::Skipped, false)).contains("skipped"));
        assert!(format_record_detail(&record(BackupStatus::Completed, true)).contains("1500 ms"));

        let completed = record(BackupStatus::Completed, true);
        let detail = format_stored_file(completed.artifact.as_ref().unwrap());
        assert!(detail.contains("CSV"));
        assert!(detail.contains("2.0 KB"));
    }
}
