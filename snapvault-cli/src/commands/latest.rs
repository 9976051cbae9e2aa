//! Snapshot inspection commands.

use anyhow::{Context, Result};
use chrono::Utc;
use snapvault::restore::RestoreOrchestrator;
use snapvault::staging::LocalStaging;

use super::{format_size, CommandContext};

/// Show the snapshot a restore would pick.
pub async fn run_latest(ctx: &CommandContext) -> Result<()> {
    let restore = RestoreOrchestrator::new(
        ctx.remote.clone(),
        ctx.codec.clone(),
        ctx.config.database_dir(),
        ctx.config.restore_staging_dir(),
    );

    let Some(info) = restore
        .latest()
        .await
        .context("Failed to list remote snapshots")?
    else {
        println!("No remote snapshots.");
        return Ok(());
    };

    let age = info.age(Utc::now());
    println!("Snapshot:  {}", info.snapshot.display_name);
    println!("Id:        {}", info.snapshot.id);
    println!("Size:      {}", format_size(info.snapshot.size_bytes));
    println!("Modified:  {}", info.snapshot.modified_at.to_rfc3339());
    if let Some(created) = info.created_at {
        println!("Created:   {}", created.to_rfc3339());
    }
    println!("Age:       {}h {}m", age.num_hours(), age.num_minutes() % 60);
    println!("Location:  {}", info.snapshot.location);

    Ok(())
}

/// List remote snapshots and committed local backups.
pub async fn run_list(ctx: &CommandContext) -> Result<()> {
    let remote = ctx
        .remote
        .list()
        .await
        .context("Failed to list remote snapshots")?;

    println!("Remote ({})", ctx.config.remote.backend);
    println!("--------------------------------------------------------------------------------");
    if remote.is_empty() {
        println!("  (none)");
    }
    for snapshot in &remote {
        println!(
            "  {:<40} {:>10}  {}  {}",
            snapshot.display_name,
            format_size(snapshot.size_bytes),
            snapshot.modified_at.format("%Y-%m-%d %H:%M:%S"),
            snapshot.id
        );
    }

    let staging = LocalStaging::from_config(&ctx.config.effective_backup())?;
    let local = staging
        .list_canonical()
        .with_context(|| format!("Failed to read {}", staging.dir().display()))?;

    println!();
    println!("Local ({})", staging.dir().display());
    println!("--------------------------------------------------------------------------------");
    if local.is_empty() {
        println!("  (none)");
    }
    for snapshot in &local {
        println!(
            "  {:<40} {:>10}  {}",
            snapshot.display_name,
            format_size(snapshot.size_bytes),
            snapshot.modified_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}
