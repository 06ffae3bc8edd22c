//! Periodic backup trigger.
//!
//! The runtime side only keeps time; each run is blocking work and goes to
//! tokio's blocking pool.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::domain::{AppError, BackupRecord};

use super::orchestrator::BackupOrchestrator;

/// Worker recorded for scheduled runs.
pub const SYSTEM_WORKER: &str = "system";

/// What a single scheduled trigger amounted to.
#[derive(Debug)]
pub enum TickOutcome {
    /// The run finished as `COMPLETED` or `SKIPPED`.
    Ran(BackupRecord),
    /// Another run held the slot.
    Busy,
    Failed(AppError),
}

/// Run one scheduled backup.
pub fn scheduled_tick(orchestrator: &BackupOrchestrator) -> TickOutcome {
    match orchestrator.run(SYSTEM_WORKER) {
        Ok(record) => TickOutcome::Ran(record),
        Err(AppError::AlreadyInProgress) => TickOutcome::Busy,
        Err(e) => TickOutcome::Failed(e),
    }
}

/// Trigger a backup every `period` until `shutdown` resolves.
///
/// The first trigger fires immediately. A run in flight when shutdown is
/// requested is allowed to finish.
pub async fn run_scheduler<F>(orchestrator: Arc<BackupOrchestrator>, period: Duration, shutdown: F)
where
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    tracing::info!(interval_secs = period.as_secs(), "Backup scheduler started");

    loop {
        tokio::select! {
            () = &mut shutdown => {
                tracing::info!("Backup scheduler stopping");
                break;
            }
            _ = ticker.tick() => {
                let orchestrator = Arc::clone(&orchestrator);
                match tokio::task::spawn_blocking(move || scheduled_tick(&orchestrator)).await {
                    Ok(TickOutcome::Ran(record)) => {
                        tracing::info!(record_id = record.id, status = %record.status, "Scheduled backup finished");
                    }
                    Ok(TickOutcome::Busy) => {
                        tracing::info!("Scheduled backup skipped, another run is in progress");
                    }
                    Ok(TickOutcome::Failed(e)) => {
                        tracing::error!(error = %e, "Scheduled backup failed");
                    }
                    Err(e) => tracing::error!(error = %e, "Scheduled backup task aborted"),
                }
            }
        }
    }
}

/// Resolves on Ctrl-C. If the signal handler cannot be installed, never resolves.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
