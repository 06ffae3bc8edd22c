//! Application layer - use cases and orchestration.
//!
//! This layer runs backups, answers history queries and formats results
//! for the CLI.

pub mod change_detector;
pub mod exporter;
pub mod formatter;
pub mod history;
pub mod orchestrator;
pub mod scheduler;

pub use formatter::{
    format_json, format_page_table, format_record_detail, format_run_result,
    format_stored_file, OutputFormat,
};
pub use history::HistoryQuery;
pub use orchestrator::BackupOrchestrator;
pub use scheduler::{ctrl_c, run_scheduler};
