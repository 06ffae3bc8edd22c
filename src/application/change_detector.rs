//! Decides whether a new snapshot is worth taking.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{ChangeCounter, Result};

/// Compares the last successful snapshot time against the change-event log.
pub struct ChangeDetector {
    counter: Arc<dyn ChangeCounter>,
}

impl ChangeDetector {
    #[must_use]
    pub fn new(counter: Arc<dyn ChangeCounter>) -> Self {
        Self { counter }
    }

    /// `true` on the first run (no completed snapshot yet), otherwise whether
    /// any change event was recorded at or after `last_completed_at`.
    ///
    /// # Errors
    /// Returns error if the change log cannot be read.
    pub fn has_changes_since(&self, last_completed_at: Option<DateTime<Utc>>) -> Result<bool> {
        let Some(since) = last_completed_at else {
            tracing::info!("No completed backup yet, treating as changed");
            return Ok(true);
        };

        let changes = self.counter.count_changes_since(since)?;
        tracing::info!(last_backup = %since, changes, "Checked for changes");

        Ok(changes > 0)
    }
}
