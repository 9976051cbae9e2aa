//! Run status reporting.
//!
//! Orchestrators report every state change and exactly one terminal outcome
//! per run to a [`RunObserver`]. Presentation (console, notifications) lives
//! in the observer.

use tracing::{debug, info, warn};

use crate::backup::{BackupOutcome, BackupRunState};
use crate::restore::{RestoreOutcome, RestoreRunState};

/// Receives progress from backup and restore runs.
pub trait RunObserver: Send + Sync {
    /// Called on every backup state transition.
    fn on_backup_state(&self, _state: BackupRunState) {}

    /// Called once when a backup run ends, whatever the outcome.
    fn on_backup_finished(&self, _outcome: &BackupOutcome) {}

    /// Called on every restore state transition.
    fn on_restore_state(&self, _state: RestoreRunState) {}

    /// Called once when a restore run ends.
    fn on_restore_finished(&self, _outcome: &RestoreOutcome) {}
}

/// Ignores everything.
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Logs run progress through `tracing`.
pub struct TracingObserver;

impl RunObserver for TracingObserver {
    fn on_backup_state(&self, state: BackupRunState) {
        debug!(state = %state, "Backup state changed");
    }

    fn on_backup_finished(&self, outcome: &BackupOutcome) {
        match outcome {
            BackupOutcome::Succeeded(report) => info!(
                file = %report.file_name,
                remote_id = %report.remote_id,
                size = report.size_bytes,
                retired = report.retention.retired,
                "Backup succeeded"
            ),
            BackupOutcome::Failed { at, error } => warn!(
                at = %at,
                class = ?error.class(),
                "Backup failed: {}",
                error
            ),
        }
    }

    fn on_restore_state(&self, state: RestoreRunState) {
        debug!(state = %state, "Restore state changed");
    }

    fn on_restore_finished(&self, outcome: &RestoreOutcome) {
        match outcome {
            RestoreOutcome::Restored(report) => info!(
                snapshot = %report.snapshot.display_name,
                files = report.summary.files,
                "Restore succeeded"
            ),
            RestoreOutcome::NothingToRestore => info!("No remote snapshot to restore"),
            RestoreOutcome::FailedDowngrade { snapshot, error } => warn!(
                snapshot = %snapshot.display_name,
                "Restore refused: {}",
                error
            ),
            RestoreOutcome::FailedUnknown { error, .. } => warn!("Restore failed: {}", error),
        }
    }
}
