//! Console progress for backup and restore runs.

use snapvault::backup::{BackupOutcome, BackupRunState};
use snapvault::restore::{RestoreOutcome, RestoreRunState};
use snapvault::status::RunObserver;

use super::format_size;

pub struct ConsoleObserver {
    prefix: String,
}

impl ConsoleObserver {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl RunObserver for ConsoleObserver {
    fn on_backup_state(&self, state: BackupRunState) {
        if !state.is_terminal() {
            eprintln!("{} {}...", self.prefix, state);
        }
    }

    fn on_backup_finished(&self, outcome: &BackupOutcome) {
        match outcome {
            BackupOutcome::Succeeded(report) => eprintln!(
                "{} Complete. {} ({})",
                self.prefix,
                report.file_name,
                format_size(report.size_bytes)
            ),
            BackupOutcome::Failed { at, error } => eprintln!(
                "{} Failed while {}: {}",
                self.prefix,
                at,
                error.class().user_message()
            ),
        }
    }

    fn on_restore_state(&self, state: RestoreRunState) {
        match state {
            RestoreRunState::Listing
            | RestoreRunState::Downloading
            | RestoreRunState::AwaitingPassphrase
            | RestoreRunState::Importing => eprintln!("{} {}...", self.prefix, state),
            _ => {}
        }
    }

    fn on_restore_finished(&self, outcome: &RestoreOutcome) {
        match outcome.failure_class() {
            Some(class) => eprintln!("{} Failed: {}", self.prefix, class.user_message()),
            None => eprintln!("{} {}", self.prefix, outcome.state()),
        }
    }
}
