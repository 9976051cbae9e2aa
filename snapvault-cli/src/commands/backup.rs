//! Backup command implementation.

use anyhow::{bail, Context, Result};
use snapvault::backup::{BackupOrchestrator, BackupOutcome, BackupQueue, Unconstrained};
use std::sync::Arc;

use super::console::ConsoleObserver;
use super::{format_size, CommandContext};

/// Run one backup through the job queue.
///
/// Without `force` nothing happens while scheduled backups are disabled.
pub async fn run_backup(ctx: &CommandContext, force: bool) -> Result<()> {
    if !force {
        let settings = ctx
            .settings
            .load()
            .with_context(|| format!("Failed to read {}", ctx.settings.path().display()))?;
        if !settings.backups_enabled {
            println!("Scheduled backups are disabled; nothing to do.");
            println!("Run `snapvault enable`, or pass --force to back up once anyway.");
            return Ok(());
        }
    }

    let mut orchestrator = BackupOrchestrator::new(
        ctx.config.effective_backup(),
        ctx.remote.clone(),
        ctx.codec.clone(),
    )
    .with_observer(Arc::new(ConsoleObserver::new("Backup:")));

    if let Some(passphrase) = ctx.passphrase()? {
        orchestrator = orchestrator.with_passphrase(passphrase);
    }

    let queue = BackupQueue::new(orchestrator, Arc::new(Unconstrained));
    let job = queue.enqueue(force).await;
    tracing::debug!(job = job.id(), force, "Backup job queued");

    match job.outcome().await.as_ref() {
        BackupOutcome::Succeeded(report) => {
            println!();
            println!("Backup file:     {}", report.local_path().display());
            println!("Remote id:       {}", report.remote_id);
            println!("Size:            {}", format_size(report.size_bytes));
            println!("Schema version:  {}", report.schema_version);
            println!("Remote retired:  {}", report.retention.retired);
            if report.retention.failed > 0 {
                println!(
                    "Retire failures: {} (retried on the next run)",
                    report.retention.failed
                );
            }
            println!("Local pruned:    {}", report.pruned_local);
            Ok(())
        }
        BackupOutcome::Failed { at, error } => {
            bail!("Backup failed while {}: {}", at, error)
        }
    }
}
