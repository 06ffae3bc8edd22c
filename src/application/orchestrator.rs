//! Backup orchestration.
//!
//! Runs one snapshot end to end: single-flight guard, change detection,
//! provisional record, export, finalization. When anything after the
//! provisional record fails, an ordered list of recovery steps runs, each in
//! its own failure boundary, before the failure is reported to the caller.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, TryLockError};

use crate::domain::{
    AppConfig, AppError, BackupRecord, BackupStatus, NewStoredFile, Result, StoredFile,
};
use crate::infrastructure::{Database, FileStore, HrSnapshots};

use super::change_detector::ChangeDetector;
use super::exporter::DataExporter;

/// Recovery steps, in the order they run after a failed export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStep {
    /// Remove the partial snapshot: row and file if a row exists, else the file.
    DiscardArtifact,
    /// Write the error log and register it as a stored file.
    WriteErrorLog,
    /// Mark the record `FAILED` referencing the error log.
    MarkFailedWithLog,
    /// Mark the record `FAILED` without an artifact, if still running.
    MarkFailedBare,
}

pub const RECOVERY_STEPS: [RecoveryStep; 4] = [
    RecoveryStep::DiscardArtifact,
    RecoveryStep::WriteErrorLog,
    RecoveryStep::MarkFailedWithLog,
    RecoveryStep::MarkFailedBare,
];

/// Result of one recovery step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    NotNeeded,
    Failed(String),
}

/// Outcomes of every recovery step, in execution order.
#[derive(Debug, Default)]
pub struct RecoveryReport {
    pub steps: Vec<(RecoveryStep, StepOutcome)>,
}

#[cfg(test)]
impl RecoveryReport {
    pub fn outcome(&self, step: RecoveryStep) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, outcome)| outcome)
    }
}

/// What a failed run had produced before failing.
#[derive(Debug, Default)]
pub struct Artifact {
    /// Snapshot file on disk, possibly partial.
    pub path: Option<PathBuf>,
    /// Metadata row, once registered.
    pub stored: Option<StoredFile>,
}

/// Mutable state threaded through the recovery steps.
struct Recovery<'a> {
    record: &'a BackupRecord,
    cause: &'a AppError,
    artifact: Artifact,
    error_log: Option<StoredFile>,
    marked_failed: bool,
}

/// Drives backup runs.
pub struct BackupOrchestrator {
    db: Arc<Database>,
    files: FileStore,
    exporter: DataExporter,
    detector: ChangeDetector,
    /// Held for the whole run; contention means another run in this process.
    run_lock: Mutex<()>,
}

impl BackupOrchestrator {
    #[must_use]
    pub fn new(
        db: Arc<Database>,
        files: FileStore,
        exporter: DataExporter,
        detector: ChangeDetector,
    ) -> Self {
        Self {
            db,
            files,
            exporter,
            detector,
            run_lock: Mutex::new(()),
        }
    }

    /// Orchestrator over the HR tables with the configured directories.
    #[must_use]
    pub fn from_config(config: &AppConfig, db: Arc<Database>) -> Self {
        let files = FileStore::new(config.backups_dir(), config.error_logs_dir());
        let exporter = DataExporter::new(HrSnapshots::new(&db), config.backup.export_batch_size);
        let detector = ChangeDetector::new(db.clone());
        Self::new(db, files, exporter, detector)
    }

    /// Run one backup on behalf of `worker`.
    ///
    /// Returns the `SKIPPED` record when nothing changed since the last
    /// completed backup, or the `COMPLETED` record.
    ///
    /// # Errors
    /// - [`AppError::AlreadyInProgress`] if another run is active; nothing is written.
    /// - [`AppError::ExportFailed`] after the record has been marked `FAILED`.
    /// - Database errors raised before a record was created.
    pub fn run(&self, worker: &str) -> Result<BackupRecord> {
        let _guard = match self.run_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                tracing::warn!(worker, "Backup rejected, a run is active in this process");
                return Err(AppError::AlreadyInProgress);
            }
            // Guards no data
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        if self.db.count_in_progress()? > 0 {
            tracing::warn!(worker, "Backup rejected, a run is already in progress");
            return Err(AppError::AlreadyInProgress);
        }

        tracing::info!(worker, "Backup requested");

        let last_completed = self.db.latest_completed_started_at()?;
        if !self.detector.has_changes_since(last_completed)? {
            let skipped = self.db.insert_backup(worker, BackupStatus::Skipped)?;
            tracing::info!(record_id = skipped.id, worker, "No changes, backup skipped");
            return Ok(skipped);
        }

        let record = self.db.insert_backup(worker, BackupStatus::InProgress)?;
        tracing::info!(
            record_id = record.id,
            worker,
            dir = %self.files.backups_dir().display(),
            "Backup started"
        );

        let mut artifact = Artifact::default();
        match self.export(&record, &mut artifact) {
            Ok(completed) => Ok(completed),
            Err(error) => {
                tracing::error!(record_id = record.id, error = %error, "Backup failed");
                let report = self.recover(&record, artifact, &error);
                tracing::info!(record_id = record.id, steps = ?report.steps, "Recovery finished");
                Err(AppError::export_failed(error))
            }
        }
    }

    /// Write the snapshot, register it, complete the record.
    fn export(&self, record: &BackupRecord, artifact: &mut Artifact) -> Result<BackupRecord> {
        let lines = self.exporter.export_all()?;
        let path = self.files.persist(lines).map_err(|failure| {
            artifact.path = failure.partial;
            failure.error
        })?;
        artifact.path = Some(path.clone());

        let stored = self.db.insert_stored_file(&NewStoredFile::from_path(&path)?)?;
        artifact.stored = Some(stored.clone());

        let completed = self
            .db
            .finish_backup(record.id, BackupStatus::Completed, Some(&stored))?;
        tracing::info!(
            record_id = completed.id,
            path = %path.display(),
            size = stored.size,
            "Backup completed"
        );

        Ok(completed)
    }

    /// Run every recovery step in order. Never fails; each step's error is
    /// logged and recorded in the report.
    pub(crate) fn recover(
        &self,
        record: &BackupRecord,
        artifact: Artifact,
        cause: &AppError,
    ) -> RecoveryReport {
        let mut state = Recovery {
            record,
            cause,
            artifact,
            error_log: None,
            marked_failed: false,
        };
        let mut report = RecoveryReport::default();

        for step in RECOVERY_STEPS {
            let outcome = match self.apply(step, &mut state) {
                Ok(true) => StepOutcome::Done,
                Ok(false) => StepOutcome::NotNeeded,
                Err(e) => {
                    tracing::error!(record_id = record.id, ?step, error = %e, "Recovery step failed");
                    StepOutcome::Failed(e.to_string())
                }
            };
            report.steps.push((step, outcome));
        }

        if !state.marked_failed {
            tracing::error!(
                record_id = record.id,
                "Backup could not be marked FAILED, record left IN_PROGRESS"
            );
        }

        report
    }

    /// Apply one step. `Ok(false)` means the step had nothing to do.
    fn apply(&self, step: RecoveryStep, state: &mut Recovery<'_>) -> Result<bool> {
        match step {
            RecoveryStep::DiscardArtifact => {
                if let Some(stored) = state.artifact.stored.take() {
                    state.artifact.path = None;
                    // The file goes even when the row cannot.
                    let row = self.db.delete_stored_file(stored.id);
                    let file = self.files.delete(Path::new(&stored.file_path));
                    match (row, file) {
                        (Ok(()), Ok(_)) => Ok(true),
                        (Err(e), Ok(_)) | (Ok(()), Err(e)) => Err(e),
                        (Err(row), Err(file)) => Err(AppError::Io {
                            message: format!(
                                "Artifact {} left behind: {row}; {file}",
                                stored.file_path
                            ),
                            source: None,
                        }),
                    }
                } else if let Some(path) = state.artifact.path.take() {
                    self.files.delete(&path)
                } else {
                    Ok(false)
                }
            }
            RecoveryStep::WriteErrorLog => {
                let context = [
                    ("backup_id", state.record.id.to_string()),
                    ("worker", state.record.worker.clone()),
                    ("started_at", state.record.started_at.to_rfc3339()),
                ];
                let path = self
                    .files
                    .write_error_log(state.cause, &context)
                    .ok_or_else(|| AppError::Io {
                        message: format!(
                            "Error log could not be written to {}",
                            self.files.error_logs_dir().display()
                        ),
                        source: None,
                    })?;
                let stored = self.db.insert_stored_file(&NewStoredFile::from_path(&path)?)?;
                state.error_log = Some(stored);
                Ok(true)
            }
            RecoveryStep::MarkFailedWithLog => {
                let Some(log) = &state.error_log else {
                    return Ok(false);
                };
                self.db
                    .finish_backup(state.record.id, BackupStatus::Failed, Some(log))?;
                state.marked_failed = true;
                Ok(true)
            }
            RecoveryStep::MarkFailedBare => {
                if state.marked_failed {
                    return Ok(false);
                }
                self.db
                    .finish_backup(state.record.id, BackupStatus::Failed, None)?;
                state.marked_failed = true;
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HistoryFilter, RowSource, SourceRow};
    use std::fs;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    /// Source that returns `good` single rows, then fails.
    struct FlakyRows {
        good: i64,
    }

    impl RowSource for FlakyRows {
        fn section(&self) -> &str {
            "EMPLOYEES"
        }

        fn headers(&self) -> &[&str] {
            &["ID", "Name"]
        }

        fn fetch_after(&self, after_id: Option<i64>, _limit: usize) -> Result<Vec<SourceRow>> {
            let next = after_id.unwrap_or(0) + 1;
            if next > self.good {
                return Err(AppError::Database {
                    message: "connection reset".into(),
                    source: None,
                });
            }
            Ok(vec![SourceRow {
                id: next,
                fields: vec![next.to_string(), format!("Employee {next}")],
            }])
        }
    }

    /// Empty source that takes a while to answer.
    struct SlowRows {
        delay: Duration,
    }

    impl RowSource for SlowRows {
        fn section(&self) -> &str {
            "EMPLOYEES"
        }

        fn headers(&self) -> &[&str] {
            &["ID"]
        }

        fn fetch_after(&self, _after_id: Option<i64>, _limit: usize) -> Result<Vec<SourceRow>> {
            thread::sleep(self.delay);
            Ok(Vec::new())
        }
    }

    fn open_db(dir: &TempDir) -> Arc<Database> {
        Arc::new(Database::open(&dir.path().join("hrbank.db")).unwrap())
    }

    fn orchestrator_with(
        db: &Arc<Database>,
        files: FileStore,
        sources: Vec<Arc<dyn RowSource>>,
    ) -> BackupOrchestrator {
        BackupOrchestrator::new(
            Arc::clone(db),
            files,
            DataExporter::new(sources, 1),
            ChangeDetector::new(db.clone()),
        )
    }

    fn default_files(dir: &TempDir) -> FileStore {
        FileStore::new(dir.path().join("backups"), dir.path().join("logs"))
    }

    fn files_in(dir: &Path) -> usize {
        fs::read_dir(dir).map_or(0, Iterator::count)
    }

    fn count_status(db: &Database, status: BackupStatus) -> u64 {
        db.count_backups(&HistoryFilter {
            status: Some(status),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_first_run_on_empty_dataset_completes() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);
        let orchestrator =
            BackupOrchestrator::from_config(&AppConfig::with_data_dir(dir.path()), db.clone());

        let record = orchestrator.run("system").unwrap();

        assert_eq!(record.status, BackupStatus::Completed);
        assert_eq!(record.worker, "system");
        assert!(record.ended_at.unwrap() >= record.started_at);

        let artifact = record.artifact.unwrap();
        assert_eq!(artifact.format, "CSV");
        let content = fs::read_to_string(&artifact.file_path).unwrap();
        assert_eq!(
            content,
            "\u{FEFF}## EMPLOYEES ##\n\
             ID,Name,Email,EmployeeNumber,Department,Position,HireDate,Status,CreatedAt\n\
             ## DEPARTMENTS ##\n\
             ID,Name,Description,EstablishedDate,CreatedAt\n"
        );
        assert_eq!(
            artifact.size,
            fs::metadata(&artifact.file_path).unwrap().len()
        );
    }

    #[test]
    fn test_skips_when_nothing_changed() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);
        let orchestrator =
            BackupOrchestrator::from_config(&AppConfig::with_data_dir(dir.path()), db.clone());

        orchestrator.run("system").unwrap();
        let skipped = orchestrator.run("10.0.0.5").unwrap();

        assert_eq!(skipped.status, BackupStatus::Skipped);
        assert!(skipped.artifact.is_none());
        assert!(skipped.ended_at.is_none());
        assert_eq!(files_in(&dir.path().join("backups")), 1);
        assert_eq!(files_in(&dir.path().join("logs")), 0);
        assert_eq!(db.find_backup(skipped.id).unwrap(), skipped);
    }

    #[test]
    fn test_change_after_backup_triggers_new_snapshot() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);
        let orchestrator =
            BackupOrchestrator::from_config(&AppConfig::with_data_dir(dir.path()), db.clone());

        orchestrator.run("system").unwrap();
        let dept = db.insert_department("R&D, Labs", Some("The \"lab\""));
        db.insert_employee("Park", "park@example.com", Some(dept));
        db.record_change();

        let record = orchestrator.run("system").unwrap();
        assert_eq!(record.status, BackupStatus::Completed);
        assert_eq!(files_in(&dir.path().join("backups")), 2);

        let content = fs::read_to_string(record.artifact.unwrap().file_path).unwrap();
        assert!(content.contains(",park@example.com,EMP-2024-001,\"R&D, Labs\",Engineer,"));
        assert!(content.contains(",\"R&D, Labs\",\"The \"\"lab\"\"\",2020-03-01,"));
    }

    #[test]
    fn test_rejects_while_another_run_in_progress() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);
        let orchestrator =
            BackupOrchestrator::from_config(&AppConfig::with_data_dir(dir.path()), db.clone());
        db.insert_backup("10.0.0.7", BackupStatus::InProgress).unwrap();

        assert!(matches!(
            orchestrator.run("system"),
            Err(AppError::AlreadyInProgress)
        ));
        assert_eq!(db.count_backups(&HistoryFilter::default()).unwrap(), 1);
        assert_eq!(files_in(&dir.path().join("backups")), 0);
    }

    #[test]
    fn test_mid_stream_failure_marks_failed_and_removes_partial() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);
        let flaky: Arc<dyn RowSource> = Arc::new(FlakyRows { good: 3 });
        let orchestrator = orchestrator_with(&db, default_files(&dir), vec![flaky]);

        let err = orchestrator.run("system").unwrap_err();
        assert!(matches!(err, AppError::ExportFailed { .. }));
        assert!(err.to_string().contains("connection reset"));

        let failed = db
            .latest_backup_by_status(BackupStatus::Failed)
            .unwrap()
            .unwrap();
        assert!(failed.ended_at.unwrap() >= failed.started_at);
        assert_eq!(db.count_in_progress().unwrap(), 0);
        assert_eq!(files_in(&dir.path().join("backups")), 0);

        let log = failed.artifact.unwrap();
        assert_eq!(log.format, "LOG");
        assert!(log.file_name.starts_with("error_log_"));
        let content = fs::read_to_string(&log.file_path).unwrap();
        assert!(content.contains("connection reset"));
        assert!(content.contains(&format!("backup_id: {}", failed.id)));
    }

    #[test]
    fn test_error_log_failure_still_marks_failed() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let files = FileStore::new(dir.path().join("backups"), blocker.join("logs"));
        let flaky: Arc<dyn RowSource> = Arc::new(FlakyRows { good: 1 });
        let orchestrator = orchestrator_with(&db, files, vec![flaky]);

        assert!(orchestrator.run("system").is_err());

        let failed = db
            .latest_backup_by_status(BackupStatus::Failed)
            .unwrap()
            .unwrap();
        assert!(failed.artifact.is_none());
        assert!(failed.ended_at.is_some());
        assert_eq!(files_in(&dir.path().join("backups")), 0);
    }

    #[test]
    fn test_recovery_discards_registered_artifact() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);
        let files = default_files(&dir);
        let orchestrator = orchestrator_with(&db, files.clone(), Vec::new());

        let record = db.insert_backup("system", BackupStatus::InProgress).unwrap();
        let path = files.persist(vec![Ok("partial".to_string())]).unwrap();
        let stored = db
            .insert_stored_file(&NewStoredFile::from_path(&path).unwrap())
            .unwrap();
        let artifact = Artifact {
            path: Some(path.clone()),
            stored: Some(stored.clone()),
        };
        let cause = AppError::Config {
            message: "finalize failed".into(),
        };

        let report = orchestrator.recover(&record, artifact, &cause);

        assert_eq!(
            report.steps,
            vec![
                (RecoveryStep::DiscardArtifact, StepOutcome::Done),
                (RecoveryStep::WriteErrorLog, StepOutcome::Done),
                (RecoveryStep::MarkFailedWithLog, StepOutcome::Done),
                (RecoveryStep::MarkFailedBare, StepOutcome::NotNeeded),
            ]
        );
        assert!(!path.exists());
        assert!(db.find_stored_file(stored.id).is_err());
        let failed = db.find_backup(record.id).unwrap();
        assert_eq!(failed.status, BackupStatus::Failed);
        assert_eq!(failed.artifact.unwrap().format, "LOG");
    }

    #[test]
    fn test_recovery_removes_file_when_row_delete_fails() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);
        let files = default_files(&dir);
        let orchestrator = orchestrator_with(&db, files.clone(), Vec::new());

        let record = db.insert_backup("system", BackupStatus::InProgress).unwrap();
        let path = files.persist(vec![Ok("partial".to_string())]).unwrap();
        // Row id that was never inserted, so the row delete fails
        let described = NewStoredFile::from_path(&path).unwrap();
        let unregistered = StoredFile {
            id: 9999,
            file_name: described.file_name,
            format: described.format,
            file_path: described.file_path,
            size: described.size,
        };
        let artifact = Artifact {
            path: Some(path.clone()),
            stored: Some(unregistered),
        };
        let cause = AppError::Config {
            message: "finalize failed".into(),
        };

        let report = orchestrator.recover(&record, artifact, &cause);

        assert!(matches!(
            report.outcome(RecoveryStep::DiscardArtifact),
            Some(StepOutcome::Failed(_))
        ));
        assert!(!path.exists());
        assert_eq!(
            report.outcome(RecoveryStep::MarkFailedWithLog),
            Some(&StepOutcome::Done)
        );
        assert_eq!(db.find_backup(record.id).unwrap().status, BackupStatus::Failed);
    }

    #[test]
    fn test_recovery_continues_after_discard_fails() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);
        let orchestrator = orchestrator_with(&db, default_files(&dir), Vec::new());

        let record = db.insert_backup("system", BackupStatus::InProgress).unwrap();
        let stuck = dir.path().join("backups").join("backup_stuck.csv");
        fs::create_dir_all(&stuck).unwrap();
        fs::write(stuck.join("inner"), b"x").unwrap();
        let artifact = Artifact {
            path: Some(stuck),
            stored: None,
        };
        let cause = AppError::Config {
            message: "stream broke".into(),
        };

        let report = orchestrator.recover(&record, artifact, &cause);

        assert!(matches!(
            report.outcome(RecoveryStep::DiscardArtifact),
            Some(StepOutcome::Failed(_))
        ));
        assert_eq!(
            report.outcome(RecoveryStep::WriteErrorLog),
            Some(&StepOutcome::Done)
        );
        assert_eq!(
            report.outcome(RecoveryStep::MarkFailedWithLog),
            Some(&StepOutcome::Done)
        );
        assert_eq!(
            report.outcome(RecoveryStep::MarkFailedBare),
            Some(&StepOutcome::NotNeeded)
        );
        let failed = db.find_backup(record.id).unwrap();
        assert_eq!(failed.status, BackupStatus::Failed);
        assert_eq!(failed.artifact.unwrap().format, "LOG");
    }

    #[test]
    fn test_recovery_falls_back_to_bare_mark() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let files = FileStore::new(dir.path().join("backups"), blocker.join("logs"));
        let orchestrator = orchestrator_with(&db, files, Vec::new());

        let record = db.insert_backup("system", BackupStatus::InProgress).unwrap();
        let cause = AppError::Config {
            message: "boom".into(),
        };

        let report = orchestrator.recover(&record, Artifact::default(), &cause);

        assert_eq!(
            report.outcome(RecoveryStep::DiscardArtifact),
            Some(&StepOutcome::NotNeeded)
        );
        assert!(matches!(
            report.outcome(RecoveryStep::WriteErrorLog),
            Some(StepOutcome::Failed(_))
        ));
        assert_eq!(
            report.outcome(RecoveryStep::MarkFailedWithLog),
            Some(&StepOutcome::NotNeeded)
        );
        assert_eq!(
            report.outcome(RecoveryStep::MarkFailedBare),
            Some(&StepOutcome::Done)
        );
        assert_eq!(db.find_backup(record.id).unwrap().status, BackupStatus::Failed);
    }

    #[test]
    fn test_recovery_never_panics_when_record_is_gone() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);
        let orchestrator = orchestrator_with(&db, default_files(&dir), Vec::new());

        let ghost = BackupRecord {
            id: 4242,
            worker: "system".into(),
            started_at: chrono::Utc::now(),
            ended_at: None,
            status: BackupStatus::InProgress,
            artifact: None,
        };
        let cause = AppError::Config {
            message: "boom".into(),
        };

        let report = orchestrator.recover(&ghost, Artifact::default(), &cause);
        assert!(matches!(
            report.outcome(RecoveryStep::MarkFailedBare),
            Some(StepOutcome::Failed(_))
        ));
    }

    #[test]
    fn test_concurrent_triggers_share_one_orchestrator() {
        let dir = tempdir().unwrap();
        let db = open_db(&dir);
        let orchestrator = Arc::new(orchestrator_with(
            &db,
            default_files(&dir),
            vec![Arc::new(SlowRows {
                delay: Duration::from_millis(100),
            }) as Arc<dyn RowSource>],
        ));

        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let orchestrator = Arc::clone(&orchestrator);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    orchestrator.run(&format!("10.0.0.{i}"))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for result in &results {
            match result {
                Ok(record) => assert!(matches!(
                    record.status,
                    BackupStatus::Completed | BackupStatus::Skipped
                )),
                Err(e) => assert!(matches!(e, AppError::AlreadyInProgress), "{e}"),
            }
        }
        assert_eq!(count_status(&db, BackupStatus::Completed), 1);
        assert_eq!(db.count_in_progress().unwrap(), 0);
    }

    #[test]
    fn test_concurrent_triggers_across_connections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hrbank.db");
        let observer = Arc::new(Database::open(&path).unwrap());

        let threads = 6;
        let barrier = Arc::new(Barrier::new(threads + 1));
        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let barrier = Arc::clone(&barrier);
                let root = dir.path().to_path_buf();
                let path = path.clone();
                thread::spawn(move || {
                    // Separate connection and run lock per thread, as separate processes would have
                    let db = Arc::new(Database::open(&path).unwrap());
                    let orchestrator = orchestrator_with(
                        &db,
                        FileStore::new(root.join("backups"), root.join("logs")),
                        vec![Arc::new(SlowRows {
                            delay: Duration::from_millis(50),
                        }) as Arc<dyn RowSource>],
                    );
                    barrier.wait();
                    orchestrator.run(&format!("worker-{i}"))
                })
            })
            .collect();

        barrier.wait();
        let mut max_seen = 0;
        while !handles.iter().all(thread::JoinHandle::is_finished) {
            max_seen = max_seen.max(observer.count_in_progress().unwrap());
            thread::sleep(Duration::from_millis(1));
        }

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(max_seen <= 1);
        assert!(results.iter().any(Result::is_ok));
        for result in &results {
            if let Err(e) = result {
                assert!(matches!(e, AppError::AlreadyInProgress), "{e}");
            }
        }
        assert!(count_status(&observer, BackupStatus::Completed) >= 1);
        assert_eq!(count_status(&observer, BackupStatus::Failed), 0);
        assert_eq!(observer.count_in_progress().unwrap(), 0);
    }
}
