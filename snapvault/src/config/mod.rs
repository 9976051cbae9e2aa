//! Configuration management for snapvault
//!
//! Default config location: ~/.snapvault/snapvault.toml

mod remote;

pub use remote::{RemoteConfig, S3RemoteConfig};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Base directory for every path left unset below
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".snapvault")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backup: BackupConfig::default(),
            database: DatabaseConfig::default(),
            remote: RemoteConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackupConfig {
    /// Directory holding committed backups and in-progress temp files
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Extension of committed backup files
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default = "default_temp_prefix")]
    pub temp_prefix: String,
    #[serde(default = "default_temp_suffix")]
    pub temp_suffix: String,
    /// Committed local backups kept after a successful run
    #[serde(default = "default_local_keep")]
    pub local_keep: usize,
}

fn default_extension() -> String {
    "backup".to_string()
}

fn default_temp_prefix() -> String {
    ".backup".to_string()
}

fn default_temp_suffix() -> String {
    ".tmp".to_string()
}

fn default_local_keep() -> usize {
    2
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: None,
            extension: default_extension(),
            temp_prefix: default_temp_prefix(),
            temp_suffix: default_temp_suffix(),
            local_keep: default_local_keep(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Directory of the live database
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// "pretty" or "json"
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_level() -> String {
    "info,snapvault=debug".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
        Ok(home.join(rest))
    } else if s == "~" {
        dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Config {
    /// Default config file path (~/.snapvault/snapvault.toml)
    pub fn default_path() -> PathBuf {
        default_data_dir().join("snapvault.toml")
    }

    /// Load config from file path, or create default
    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)?;
            let mut config: Config = toml::from_str(&content)?;
            config.expand_paths()?;
            Ok(config)
        } else {
            let mut config = Config::default();
            if let Some(parent) = config_path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            let _ = config.save(config_path);
            config.expand_paths()?;
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Expand ~ in all paths
    fn expand_paths(&mut self) -> Result<()> {
        self.data_dir = expand_tilde(&self.data_dir)?;
        if let Some(ref dir) = self.backup.dir {
            self.backup.dir = Some(expand_tilde(dir)?);
        }
        if let Some(ref dir) = self.database.dir {
            self.database.dir = Some(expand_tilde(dir)?);
        }
        if let Some(ref path) = self.remote.path {
            self.remote.path = Some(expand_tilde(path)?);
        }
        Ok(())
    }

    /// Create the directories snapvault writes into
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(self.backup_dir())?;
        fs::create_dir_all(self.restore_staging_dir())?;
        Ok(())
    }

    /// Backup settings with the directory resolved against `data_dir`
    pub fn effective_backup(&self) -> BackupConfig {
        BackupConfig {
            dir: Some(self.backup_dir()),
            ..self.backup.clone()
        }
    }

    /// Get path to the backup directory
    pub fn backup_dir(&self) -> PathBuf {
        self.backup
            .dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("backups"))
    }

    /// Get path to the live database directory
    pub fn database_dir(&self) -> PathBuf {
        self.database
            .dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("db"))
    }

    /// Get path to the directory restore downloads are staged in
    pub fn restore_staging_dir(&self) -> PathBuf {
        self.data_dir.join("restore")
    }

    /// Get path to the persisted settings file
    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }
}
