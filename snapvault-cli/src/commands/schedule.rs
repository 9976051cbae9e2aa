//! Turning scheduled backups on and off.

use anyhow::{Context, Result};

use super::CommandContext;

/// Persist whether `snapvault backup` runs without `--force`.
pub fn run_set_enabled(ctx: &CommandContext, enabled: bool) -> Result<()> {
    let settings = ctx
        .settings
        .update(|s| s.backups_enabled = enabled)
        .with_context(|| format!("Failed to write {}", ctx.settings.path().display()))?;

    tracing::info!(enabled = settings.backups_enabled, "Scheduled backups updated");
    if settings.backups_enabled {
        println!("Scheduled backups enabled.");
    } else {
        println!("Scheduled backups disabled.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapvault::Config;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_toggle_round_trips_through_settings() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let ctx = CommandContext::new(config, None).unwrap();
        assert!(!ctx.settings.load().unwrap().backups_enabled);

        run_set_enabled(&ctx, true).unwrap();
        assert!(ctx.settings.load().unwrap().backups_enabled);

        run_set_enabled(&ctx, false).unwrap();
        assert!(!ctx.settings.load().unwrap().backups_enabled);
    }
}
