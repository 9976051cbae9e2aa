//! Persisted application settings.
//!
//! A small JSON document next to the config holding state the application
//! changes at runtime rather than the user editing by hand.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Whether scheduled backups run
    #[serde(default)]
    pub backups_enabled: bool,
    /// Passphrase used for future backups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
    /// Display name of the last snapshot restored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_restored: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the settings. A missing file yields the defaults.
    pub fn load(&self) -> Result<Settings> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the settings file contents.
    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(settings)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Load, modify, and save in one step.
    pub fn update(&self, f: impl FnOnce(&mut Settings)) -> Result<Settings> {
        let mut settings = self.load()?;
        f(&mut settings);
        self.save(&settings)?;
        Ok(settings)
    }
}
