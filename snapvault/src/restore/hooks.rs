//! Work that follows a successful restore.

use async_trait::async_trait;
use snapvault_storage::Snapshot;
use std::path::Path;
use tracing::debug;

use crate::error::Result;
use crate::run_blocking;
use crate::settings::SettingsStore;

/// What a hook knows about the restore that just finished.
pub struct RestoreContext<'a> {
    pub snapshot: &'a Snapshot,
    pub passphrase: &'a str,
    pub database_dir: &'a Path,
}

/// Runs after the restored database is in place. Errors are logged by the
/// caller and never undo the restore.
#[async_trait]
pub trait PostRestoreHook: Send + Sync {
    fn name(&self) -> &'static str;

    async fn after_restore(&self, ctx: &RestoreContext<'_>) -> Result<()>;
}

/// Turns scheduled backups back on and records what was restored.
pub struct EnableScheduledBackups {
    settings: SettingsStore,
}

impl EnableScheduledBackups {
    pub fn new(settings: SettingsStore) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl PostRestoreHook for EnableScheduledBackups {
    fn name(&self) -> &'static str {
        "enable-scheduled-backups"
    }

    async fn after_restore(&self, ctx: &RestoreContext<'_>) -> Result<()> {
        let settings = self.settings.clone();
        let restored = ctx.snapshot.display_name.clone();
        run_blocking(move || {
            settings.update(|s| {
                s.backups_enabled = true;
                s.last_restored = Some(restored);
            })
        })
        .await?;
        debug!("Scheduled backups enabled");
        Ok(())
    }
}

/// Keeps the passphrase that opened the snapshot for future backups.
pub struct RememberPassphrase {
    settings: SettingsStore,
}

impl RememberPassphrase {
    pub fn new(settings: SettingsStore) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl PostRestoreHook for RememberPassphrase {
    fn name(&self) -> &'static str {
        "remember-passphrase"
    }

    async fn after_restore(&self, ctx: &RestoreContext<'_>) -> Result<()> {
        let settings = self.settings.clone();
        let passphrase = ctx.passphrase.to_string();
        run_blocking(move || settings.update(|s| s.passphrase = Some(passphrase))).await?;
        Ok(())
    }
}
