pub mod backup;
pub mod console;
pub mod init;
pub mod latest;
pub mod restore;
pub mod schedule;

pub use backup::run_backup;
pub use init::run_init_config;
pub use latest::{run_latest, run_list};
pub use restore::run_restore;
pub use schedule::run_set_enabled;

use anyhow::{Context, Result};
use snapvault::codec::ArchiveCodec;
use snapvault::restore::recover_interrupted_restore;
use snapvault::settings::SettingsStore;
use snapvault::{Config, RemoteStore, SerialRemote};
use std::sync::Arc;

/// Everything a command needs, built once from the loaded config.
pub struct CommandContext {
    pub config: Config,
    pub remote: Arc<dyn RemoteStore>,
    pub codec: Arc<ArchiveCodec>,
    pub settings: SettingsStore,
    passphrase: Option<String>,
}

impl CommandContext {
    pub fn new(config: Config, passphrase: Option<String>) -> Result<Self> {
        let inner = config
            .remote
            .create_remote(&config.data_dir)
            .context("Failed to open remote store")?;
        tracing::debug!("Remote backend: {}", inner.backend_name());

        let database_dir = config.database_dir();
        if recover_interrupted_restore(&database_dir)
            .with_context(|| format!("Failed to recover {}", database_dir.display()))?
        {
            tracing::warn!(
                "Recovered {} from an interrupted restore",
                database_dir.display()
            );
        }

        let remote: Arc<dyn RemoteStore> = Arc::new(SerialRemote::spawn(inner));
        let codec = Arc::new(ArchiveCodec::new(config.database_dir()));
        let settings = SettingsStore::new(config.settings_path());

        Ok(Self {
            config,
            remote,
            codec,
            settings,
            passphrase,
        })
    }

    /// `--passphrase` / `SNAPVAULT_PASSPHRASE`, then the remembered one.
    pub fn passphrase(&self) -> Result<Option<String>> {
        if let Some(p) = self.passphrase.as_ref().filter(|p| !p.is_empty()) {
            return Ok(Some(p.clone()));
        }
        let settings = self
            .settings
            .load()
            .with_context(|| format!("Failed to read {}", self.settings.path().display()))?;
        Ok(settings.passphrase)
    }
}

pub(crate) fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
