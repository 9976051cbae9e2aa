//! Restore command implementation.

use anyhow::{bail, Result};
use snapvault::restore::{
    EnableScheduledBackups, RememberPassphrase, RestoreOrchestrator, RestoreOutcome,
};
use std::sync::Arc;

use super::console::ConsoleObserver;
use super::CommandContext;

/// Restore the newest remote snapshot over the configured database.
pub async fn run_restore(ctx: &CommandContext) -> Result<()> {
    let passphrase = ctx.passphrase()?.unwrap_or_default();

    let restore = RestoreOrchestrator::new(
        ctx.remote.clone(),
        ctx.codec.clone(),
        ctx.config.database_dir(),
        ctx.config.restore_staging_dir(),
    )
    .with_hook(Arc::new(EnableScheduledBackups::new(ctx.settings.clone())))
    .with_hook(Arc::new(RememberPassphrase::new(ctx.settings.clone())))
    .with_observer(Arc::new(ConsoleObserver::new("Restore:")));

    let outcome = restore.run(&passphrase).await;

    match &outcome {
        RestoreOutcome::Restored(report) => {
            println!();
            println!("Restored snapshot: {}", report.snapshot.display_name);
            println!("Files extracted:   {}", report.summary.files);
            println!("Bytes extracted:   {}", report.summary.bytes);
            println!("Database:          {}", report.database_dir.display());
            for hook in &report.failed_hooks {
                println!("Warning: post-restore step '{}' failed", hook);
            }
            Ok(())
        }
        RestoreOutcome::NothingToRestore => {
            println!("No remote snapshot found; nothing restored.");
            Ok(())
        }
        RestoreOutcome::FailedDowngrade { snapshot, error } => {
            bail!("Cannot restore {}: {}", snapshot.display_name, error)
        }
        RestoreOutcome::FailedUnknown { error, .. } => {
            if outcome.should_reprompt() {
                eprintln!("Run again with --passphrase or SNAPVAULT_PASSPHRASE set.");
            }
            bail!("Restore failed: {}", error)
        }
    }
}
