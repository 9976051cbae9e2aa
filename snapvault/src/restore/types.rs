use chrono::{DateTime, Utc};
use snapvault_storage::Snapshot;
use std::fmt;
use std::path::PathBuf;

use crate::codec::ImportSummary;
use crate::error::{Error, FailureClass};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestoreRunState {
    Idle,
    Listing,
    Downloading,
    AwaitingPassphrase,
    Importing,
    Succeeded,
    FailedDowngrade,
    FailedUnknown,
    /// The remote holds no snapshot. Not a failure.
    NothingToRestore,
}

impl RestoreRunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreRunState::Idle => "idle",
            RestoreRunState::Listing => "listing",
            RestoreRunState::Downloading => "downloading",
            RestoreRunState::AwaitingPassphrase => "awaiting-passphrase",
            RestoreRunState::Importing => "importing",
            RestoreRunState::Succeeded => "succeeded",
            RestoreRunState::FailedDowngrade => "failed-downgrade",
            RestoreRunState::FailedUnknown => "failed-unknown",
            RestoreRunState::NothingToRestore => "nothing-to-restore",
        }
    }
}

impl fmt::Display for RestoreRunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct RestoreReport {
    pub snapshot: Snapshot,
    pub summary: ImportSummary,
    /// Directory now holding the restored database
    pub database_dir: PathBuf,
    /// Hooks that returned an error
    pub failed_hooks: Vec<&'static str>,
}

#[derive(Debug)]
pub enum RestoreOutcome {
    Restored(RestoreReport),
    NothingToRestore,
    /// The snapshot needs a newer version of the application.
    FailedDowngrade { snapshot: Snapshot, error: Error },
    /// Anything else; `snapshot` is unset when listing failed.
    FailedUnknown {
        snapshot: Option<Snapshot>,
        error: Error,
    },
}

impl RestoreOutcome {
    pub fn state(&self) -> RestoreRunState {
        match self {
            RestoreOutcome::Restored(_) => RestoreRunState::Succeeded,
            RestoreOutcome::NothingToRestore => RestoreRunState::NothingToRestore,
            RestoreOutcome::FailedDowngrade { .. } => RestoreRunState::FailedDowngrade,
            RestoreOutcome::FailedUnknown { .. } => RestoreRunState::FailedUnknown,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RestoreOutcome::FailedDowngrade { .. } | RestoreOutcome::FailedUnknown { .. }
        )
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            RestoreOutcome::FailedDowngrade { error, .. }
            | RestoreOutcome::FailedUnknown { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn failure_class(&self) -> Option<FailureClass> {
        self.error().map(Error::class)
    }

    /// Whether the user should be asked for the passphrase again.
    pub fn should_reprompt(&self) -> bool {
        match self {
            RestoreOutcome::FailedUnknown { error, .. } => {
                error.class().should_reprompt() || error.class() == FailureClass::Precondition
            }
            _ => false,
        }
    }
}

/// The newest remote snapshot, as shown before a restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    pub snapshot: Snapshot,
    /// Creation time from the canonical file name, if it has one
    pub created_at: Option<DateTime<Utc>>,
}

impl BackupInfo {
    /// Age relative to `now`, from the name when possible.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at.unwrap_or(self.snapshot.modified_at)
    }
}
