use snapvault_storage::Snapshot;
use std::fmt;
use std::path::PathBuf;

use crate::error::{Error, FailureClass};
use crate::retention::RetentionReport;

/// Where a backup run is. Owned by exactly one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackupRunState {
    Idle,
    Staging,
    Exporting,
    Uploading,
    Retiring,
    Committing,
    Failed,
    Succeeded,
}

impl BackupRunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BackupRunState::Failed | BackupRunState::Succeeded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackupRunState::Idle => "idle",
            BackupRunState::Staging => "staging",
            BackupRunState::Exporting => "exporting",
            BackupRunState::Uploading => "uploading",
            BackupRunState::Retiring => "retiring",
            BackupRunState::Committing => "committing",
            BackupRunState::Failed => "failed",
            BackupRunState::Succeeded => "succeeded",
        }
    }
}

impl fmt::Display for BackupRunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful backup run.
#[derive(Debug, Clone)]
pub struct BackupReport {
    /// Id the remote assigned to the upload
    pub remote_id: String,
    /// Canonical file name, locally and remotely
    pub file_name: String,
    /// The committed local file
    pub local: Snapshot,
    pub size_bytes: u64,
    /// Schema version written into the snapshot
    pub schema_version: u32,
    pub retention: RetentionReport,
    /// Older local backups removed after the commit
    pub pruned_local: usize,
}

impl BackupReport {
    pub fn local_path(&self) -> PathBuf {
        PathBuf::from(self.local.location.trim_start_matches("file://"))
    }
}

#[derive(Debug)]
pub enum BackupOutcome {
    Succeeded(BackupReport),
    /// `at` is the state the run was in when it failed.
    Failed { at: BackupRunState, error: Error },
}

impl BackupOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BackupOutcome::Succeeded(_))
    }

    /// Terminal state of the run.
    pub fn state(&self) -> BackupRunState {
        match self {
            BackupOutcome::Succeeded(_) => BackupRunState::Succeeded,
            BackupOutcome::Failed { .. } => BackupRunState::Failed,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            BackupOutcome::Succeeded(_) => None,
            BackupOutcome::Failed { error, .. } => Some(error),
        }
    }

    pub fn failure_class(&self) -> Option<FailureClass> {
        self.error().map(Error::class)
    }
}
