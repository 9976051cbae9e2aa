//! Remote snapshot retention.

use snapvault_storage::{RemoteStore, Snapshot};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Summary of a retention pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    /// Snapshots deleted
    pub retired: usize,
    /// Deletes that failed and were left for the next run
    pub failed: usize,
    /// Snapshots the predicate kept
    pub kept: usize,
}

pub struct RetentionManager {
    remote: Arc<dyn RemoteStore>,
}

impl RetentionManager {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self { remote }
    }

    /// Delete every snapshot in `listing` that `keep` rejects.
    ///
    /// Each delete stands alone: a failure is logged and counted, and the
    /// remaining deletes still run.
    pub async fn retire_except<F>(&self, listing: &[Snapshot], keep: F) -> RetentionReport
    where
        F: Fn(&Snapshot) -> bool,
    {
        let mut report = RetentionReport::default();

        for snapshot in listing {
            if keep(snapshot) {
                report.kept += 1;
                continue;
            }

            match self.remote.delete(&snapshot.id).await {
                Ok(()) => {
                    debug!("Retired {} ({})", snapshot.display_name, snapshot.id);
                    report.retired += 1;
                }
                Err(e) => {
                    warn!(
                        "Failed to retire {} ({}): {}",
                        snapshot.display_name, snapshot.id, e
                    );
                    report.failed += 1;
                }
            }
        }

        if report.retired > 0 || report.failed > 0 {
            info!(
                retired = report.retired,
                failed = report.failed,
                kept = report.kept,
                "Retention pass finished"
            );
        }
        report
    }

    /// List the remote and retire everything except `keep_id`.
    pub async fn retire_all_except(&self, keep_id: &str) -> Result<RetentionReport> {
        let listing = self.remote.list().await?;
        Ok(self.retire_except(&listing, |s| s.id == keep_id).await)
    }
}
