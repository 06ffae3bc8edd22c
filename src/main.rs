//! HR Backup - change-aware CSV snapshots of HR records.
//!
//! Exports employees and departments to a timestamped CSV file whenever the
//! HR data changed since the last completed backup, keeps a history of every
//! run, and serves that history with cursor pagination.
//!
//! QUICK START:
//!   hr-backup init                          # Write config, create directories
//!   hr-backup run --worker 10.0.0.5         # Back up now
//!   hr-backup daemon --interval 3600        # Back up every hour
//!   hr-backup latest --status FAILED        # Most recent failed run
//!   hr-backup history --size 20             # Browse history
//!   hr-backup file 3 -o snapshot.csv        # Copy a stored artifact out

mod application;
mod cli;
mod domain;
mod infrastructure;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use application::{
    format_json, format_page_table, format_record_detail, format_run_result, format_stored_file,
    BackupOrchestrator, HistoryQuery, OutputFormat,
};
use cli::{Cli, Commands, HistoryArgs};
use domain::{AppConfig, BackupStatus};
use infrastructure::{ensure_config_exists, load_config, Database};

fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        for cause in e.chain().skip(1) {
            eprintln!("  {} {}", "caused by:".red(), cause);
        }
        std::process::exit(1);
    }
}

/// Main application logic.
fn run(cli: Cli) -> anyhow::Result<()> {
    let format = cli.output_format().map_err(anyhow::Error::msg)?;
    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Init => cmd_init(&config)?,
        Commands::Run { worker } => cmd_run(&config, &worker, format)?,
        Commands::Daemon { interval } => cmd_daemon(&config, interval)?,
        Commands::Latest { status } => cmd_latest(&config, &status, format)?,
        Commands::Show { id } => cmd_show(&config, id, format)?,
        Commands::File { id, output } => cmd_file(&config, id, output.as_deref(), format)?,
        Commands::History {
            worker,
            status,
            from,
            to,
            cursor,
            size,
            sort_field,
            sort_direction,
        } => {
            let args = HistoryArgs {
                worker: worker.as_deref(),
                status: status.as_deref(),
                from: from.as_deref(),
                to: to.as_deref(),
                cursor: cursor.as_deref(),
                size,
                sort_field: &sort_field,
                sort_direction: &sort_direction,
            };
            cmd_history(&config, &args, format)?;
        }
    }

    Ok(())
}

fn open_database(config: &AppConfig) -> anyhow::Result<Arc<Database>> {
    let path = config.database_path();
    let db = Database::open(&path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(Arc::new(db))
}

/// Initialize configuration, storage directories and the database.
fn cmd_init(config: &AppConfig) -> anyhow::Result<()> {
    let config_path = ensure_config_exists(config)?;
    println!("{} Config: {}", "✓".green().bold(), config_path.display());

    for dir in [
        config.backups_dir(),
        config.error_logs_dir(),
        config.profile_images_dir(),
    ] {
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        println!("{} Directory: {}", "✓".green().bold(), dir.display());
    }

    open_database(config)?;
    println!(
        "{} Database: {}",
        "✓".green().bold(),
        config.database_path().display()
    );

    Ok(())
}

/// Run one backup on demand.
fn cmd_run(config: &AppConfig, worker: &str, format: OutputFormat) -> anyhow::Result<()> {
    let db = open_database(config)?;
    let orchestrator = BackupOrchestrator::from_config(config, db);

    let record = orchestrator.run(worker)?;

    match format {
        OutputFormat::Json => println!("{}", format_json(&record)?),
        OutputFormat::Table => println!("{}", format_run_result(&record)),
    }

    Ok(())
}

/// Run the scheduler until Ctrl-C.
fn cmd_daemon(config: &AppConfig, interval: Option<u64>) -> anyhow::Result<()> {
    if !config.backup.enabled && interval.is_none() {
        bail!("Scheduled backups are disabled (backup.enabled = false)");
    }

    let period = interval.unwrap_or(config.backup.interval_secs);
    if period == 0 {
        bail!("Backup interval must be at least one second");
    }

    let db = open_database(config)?;
    let orchestrator = Arc::new(BackupOrchestrator::from_config(config, db));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    println!(
        "{} Backing up every {}s, press Ctrl-C to stop",
        "⏱".bold(),
        period.to_string().cyan()
    );

    runtime.block_on(application::run_scheduler(
        orchestrator,
        Duration::from_secs(period),
        application::ctrl_c(),
    ));

    println!("{} Scheduler stopped", "✓".green().bold());
    Ok(())
}

/// Show the most recent backup with a status.
fn cmd_latest(config: &AppConfig, status: &str, format: OutputFormat) -> anyhow::Result<()> {
    let status: BackupStatus = status.parse()?;
    let query = HistoryQuery::new(open_database(config)?);

    let record = query.latest_by_status(status)?;

    match (format, record) {
        (OutputFormat::Json, record) => println!("{}", format_json(&record)?),
        (OutputFormat::Table, Some(record)) => println!("{}", format_record_detail(&record)),
        (OutputFormat::Table, None) => println!("No {status} backup found"),
    }

    Ok(())
}

/// Show a single record.
fn cmd_show(config: &AppConfig, id: i64, format: OutputFormat) -> anyhow::Result<()> {
    let query = HistoryQuery::new(open_database(config)?);
    let record = query.find_backup(id)?;

    match format {
        OutputFormat::Json => println!("{}", format_json(&record)?),
        OutputFormat::Table => println!("{}", format_record_detail(&record)),
    }

    Ok(())
}

/// Show a stored artifact or copy it out.
fn cmd_file(
    config: &AppConfig,
    id: i64,
    output: Option<&Path>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let query = HistoryQuery::new(open_database(config)?);
    let file = query.find_file(id)?;

    if let Some(dest) = output {
        let bytes = fs::copy(&file.file_path, dest)
            .with_context(|| format!("Failed to copy {} to {}", file.file_path, dest.display()))?;
        println!(
            "{} Copied {} ({bytes} bytes) to {}",
            "✓".green().bold(),
            file.file_name.cyan(),
            dest.display()
        );
        return Ok(());
    }

    match format {
        OutputFormat::Json => println!("{}", format_json(&file)?),
        OutputFormat::Table => println!("{}", format_stored_file(&file)),
    }

    Ok(())
}

/// List one page of history.
fn cmd_history(config: &AppConfig, args: &HistoryArgs<'_>, format: OutputFormat) -> anyhow::Result<()> {
    let request = args.to_request()?;
    let query = HistoryQuery::new(open_database(config)?);

    let page = query.list_history(&request)?;

    match format {
        OutputFormat::Json => println!("{}", format_json(&page)?),
        OutputFormat::Table => println!("{}", format_page_table(&page)),
    }

    Ok(())
}

/// Setup tracing/logging based on verbosity level.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
