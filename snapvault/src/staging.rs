//! Local staging directory for backup files.
//!
//! A run writes its snapshot into a temp file named
//! `<prefix><uuid><suffix>` and only renames it to the canonical
//! `backup-<YYYY-MM-DD-HH-mm-ss>.<ext>` once the upload is done. Any temp
//! file found at the start of a run belongs to a crashed run.

use chrono::{DateTime, NaiveDateTime, Utc};
use snapvault_storage::Snapshot;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::BackupConfig;
use crate::error::{Error, Result};

const CANONICAL_PREFIX: &str = "backup-";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// A run's in-progress snapshot file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempFile {
    pub path: PathBuf,
    pub name: String,
}

/// Exclusive hold on a staging directory for the length of one run.
///
/// The OS releases the lock when the handle is dropped or the process dies,
/// so a crashed run never leaves the directory locked.
#[derive(Debug)]
pub struct StagingLock {
    _file: File,
    path: PathBuf,
}

impl StagingLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Clone)]
pub struct LocalStaging {
    dir: PathBuf,
    temp_prefix: String,
    temp_suffix: String,
    extension: String,
}

impl LocalStaging {
    pub fn new(
        dir: impl Into<PathBuf>,
        temp_prefix: impl Into<String>,
        temp_suffix: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            dir: dir.into(),
            temp_prefix: temp_prefix.into(),
            temp_suffix: temp_suffix.into(),
            extension: extension.into(),
        }
    }

    /// Staging for a configured backup directory.
    pub fn from_config(config: &BackupConfig) -> Result<Self> {
        let dir = config
            .dir
            .clone()
            .ok_or_else(|| Error::Precondition("no backup directory configured".to_string()))?;
        Ok(Self::new(
            dir,
            config.temp_prefix.clone(),
            config.temp_suffix.clone(),
            config.extension.clone(),
        ))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn is_temp_name(&self, name: &str) -> bool {
        name.len() > self.temp_prefix.len() + self.temp_suffix.len()
            && name.starts_with(&self.temp_prefix)
            && name.ends_with(&self.temp_suffix)
    }

    /// Remove temp files left behind by earlier runs. Best-effort.
    pub fn purge_stale_temp_files(&self) -> usize {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot scan {} for stale temp files: {}", self.dir.display(), e);
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !self.is_temp_name(&name) {
                continue;
            }
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!("Removed stale temp file {}", name);
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove stale temp file {}: {}", name, e),
            }
        }
        removed
    }

    pub fn create_temp_file(&self) -> Result<TempFile> {
        let name = format!("{}{}{}", self.temp_prefix, Uuid::new_v4(), self.temp_suffix);
        let path = self.dir.join(&name);

        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;

        debug!("Created temp file {}", path.display());
        Ok(TempFile { path, name })
    }

    /// Move `temp` to `final_name` without ever replacing an existing file.
    pub fn commit(&self, temp: &TempFile, final_name: &str) -> Result<PathBuf> {
        let target = self.dir.join(final_name);

        match fs::hard_link(&temp.path, &target) {
            Ok(()) => {
                if let Err(e) = fs::remove_file(&temp.path) {
                    warn!("Committed {} but could not unlink temp: {}", final_name, e);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(Error::AlreadyExists(target));
            }
            // Filesystems without hard links
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::Unsupported | io::ErrorKind::PermissionDenied
                ) =>
            {
                if target.exists() {
                    return Err(Error::AlreadyExists(target));
                }
                fs::rename(&temp.path, &target)?;
            }
            Err(e) => return Err(e.into()),
        }

        debug!("Committed {}", target.display());
        Ok(target)
    }

    /// Delete the temp file. Missing files are fine.
    pub fn cleanup(&self, temp: &TempFile) {
        match fs::remove_file(&temp.path) {
            Ok(()) => debug!("Removed temp file {}", temp.name),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove temp file {}: {}", temp.name, e),
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.dir.join(name).exists()
    }

    /// Whether a file can actually be created in the directory.
    ///
    /// The check file uses the temp pattern, so a leftover from a killed
    /// process is purged by the next run.
    pub fn is_writable(&self) -> bool {
        if !self.dir.is_dir() {
            return false;
        }
        let name = format!("{}{}{}", self.temp_prefix, Uuid::new_v4(), self.temp_suffix);
        let path = self.dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                drop(file);
                if let Err(e) = fs::remove_file(&path) {
                    warn!("Failed to remove {}: {}", path.display(), e);
                }
                true
            }
            Err(e) => {
                debug!("{} is not writable: {}", self.dir.display(), e);
                false
            }
        }
    }

    /// Lock file guarding the directory. Lives next to it, not inside, so
    /// listings of the directory never see it.
    pub fn lock_path(&self) -> PathBuf {
        let name = self
            .dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "staging".to_string());
        let parent = self.dir.parent().unwrap_or(&self.dir);
        parent.join(format!(".{}.lock", name))
    }

    /// Take the directory for one run. Fails fast if another process or
    /// another run in this process holds it.
    pub fn try_lock(&self) -> Result<StagingLock> {
        let path = self.lock_path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        match file.try_lock() {
            Ok(()) => {
                debug!("Locked {}", self.dir.display());
                Ok(StagingLock { _file: file, path })
            }
            Err(TryLockError::WouldBlock) => Err(Error::Precondition(format!(
                "{} is in use by another backup run",
                self.dir.display()
            ))),
            Err(TryLockError::Error(e)) => Err(e.into()),
        }
    }

    pub fn canonical_name(&self, now: DateTime<Utc>) -> String {
        format!(
            "{}{}.{}",
            CANONICAL_PREFIX,
            now.format(TIMESTAMP_FORMAT),
            self.extension
        )
    }

    /// Committed backups in this directory, newest first.
    pub fn list_canonical(&self) -> Result<Vec<Snapshot>> {
        let mut backups = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Some(created) = parse_backup_timestamp(&name, &self.extension) else {
                continue;
            };
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            backups.push(Snapshot::local(&entry.path(), meta.len(), created));
        }

        backups.sort_by(|a, b| {
            b.modified_at
                .cmp(&a.modified_at)
                .then_with(|| b.display_name.cmp(&a.display_name))
        });
        Ok(backups)
    }

    /// Delete committed backups beyond the newest `keep`. Best-effort.
    pub fn prune_canonical(&self, keep: usize) -> usize {
        let backups = match self.list_canonical() {
            Ok(backups) => backups,
            Err(e) => {
                warn!("Cannot list local backups for pruning: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for backup in backups.iter().skip(keep) {
            match fs::remove_file(self.dir.join(&backup.display_name)) {
                Ok(()) => {
                    debug!("Pruned local backup {}", backup.display_name);
                    removed += 1;
                }
                Err(e) => warn!("Failed to prune {}: {}", backup.display_name, e),
            }
        }
        removed
    }
}

/// Parse the creation time out of `backup-<YYYY-MM-DD-HH-mm-ss>.<ext>`.
pub fn parse_backup_timestamp(name: &str, extension: &str) -> Option<DateTime<Utc>> {
    let stamp = name
        .strip_prefix(CANONICAL_PREFIX)?
        .strip_suffix(extension)?
        .strip_suffix('.')?;
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
