//! Restore the newest remote snapshot.
//!
//! ```text
//! Idle → Listing → Downloading → AwaitingPassphrase → Importing
//!      → Succeeded | FailedDowngrade | FailedUnknown
//! ```
//!
//! The snapshot is imported into a fresh sibling of the database directory
//! and only swapped in once the import succeeded, so a failed restore never
//! touches the existing database.

use snapvault_storage::{RemoteStore, Snapshot};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::hooks::{PostRestoreHook, RestoreContext};
use super::types::{BackupInfo, RestoreOutcome, RestoreReport, RestoreRunState};
use crate::codec::{ImportSummary, SnapshotCodec};
use crate::error::{Error, Result};
use crate::run_blocking;
use crate::staging::{parse_backup_timestamp, LocalStaging};
use crate::status::{NoopObserver, RunObserver};

const DOWNLOAD_PREFIX: &str = ".restore";
const DOWNLOAD_SUFFIX: &str = ".tmp";

pub struct RestoreOrchestrator {
    remote: Arc<dyn RemoteStore>,
    codec: Arc<dyn SnapshotCodec>,
    database_dir: PathBuf,
    staging_dir: PathBuf,
    hooks: Vec<Arc<dyn PostRestoreHook>>,
    observer: Arc<dyn RunObserver>,
}

impl RestoreOrchestrator {
    /// `staging_dir` receives the downloaded snapshot while it is imported.
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        codec: Arc<dyn SnapshotCodec>,
        database_dir: impl Into<PathBuf>,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            remote,
            codec,
            database_dir: database_dir.into(),
            staging_dir: staging_dir.into(),
            hooks: Vec::new(),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn PostRestoreHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// The snapshot a restore would pick, if any.
    pub async fn latest(&self) -> Result<Option<BackupInfo>> {
        let listing = self.remote.list().await?;
        Ok(newest(listing).map(|snapshot| {
            let created_at = snapshot
                .display_name
                .rsplit_once('.')
                .and_then(|(_, ext)| parse_backup_timestamp(&snapshot.display_name, ext));
            BackupInfo {
                snapshot,
                created_at,
            }
        }))
    }

    /// Restore the newest remote snapshot with `passphrase`.
    #[instrument(skip(self, passphrase), fields(backend = self.remote.backend_name()))]
    pub async fn run(&self, passphrase: &str) -> RestoreOutcome {
        let outcome = self.execute(passphrase).await;
        self.enter(outcome.state());
        self.observer.on_restore_finished(&outcome);
        outcome
    }

    fn enter(&self, state: RestoreRunState) {
        debug!(state = %state, "restore transition");
        self.observer.on_restore_state(state);
    }

    async fn execute(&self, passphrase: &str) -> RestoreOutcome {
        self.enter(RestoreRunState::Listing);
        let listing = match self.remote.list().await {
            Ok(listing) => listing,
            Err(e) => {
                return RestoreOutcome::FailedUnknown {
                    snapshot: None,
                    error: e.into(),
                }
            }
        };
        let Some(snapshot) = newest(listing) else {
            info!("Remote holds no snapshots");
            return RestoreOutcome::NothingToRestore;
        };
        info!(
            "Restoring {} ({} bytes, modified {})",
            snapshot.display_name, snapshot.size_bytes, snapshot.modified_at
        );

        self.enter(RestoreRunState::Downloading);
        let staging = LocalStaging::new(&self.staging_dir, DOWNLOAD_PREFIX, DOWNLOAD_SUFFIX, "");
        let temp = {
            let staging = staging.clone();
            run_blocking(move || {
                fs::create_dir_all(staging.dir())?;
                staging.purge_stale_temp_files();
                staging.create_temp_file()
            })
            .await
        };
        let temp = match temp {
            Ok(temp) => temp,
            Err(error) => {
                return RestoreOutcome::FailedUnknown {
                    snapshot: Some(snapshot),
                    error,
                }
            }
        };

        let outcome = self.import_downloaded(snapshot, &temp.path, passphrase).await;

        let cleaned = run_blocking(move || {
            staging.cleanup(&temp);
            Ok(())
        })
        .await;
        if let Err(e) = cleaned {
            warn!("Download cleanup did not run: {}", e);
        }

        outcome
    }

    async fn import_downloaded(
        &self,
        snapshot: Snapshot,
        download: &Path,
        passphrase: &str,
    ) -> RestoreOutcome {
        if let Err(e) = self
            .remote
            .download(&snapshot.id, &snapshot.display_name, download)
            .await
        {
            return RestoreOutcome::FailedUnknown {
                snapshot: Some(snapshot),
                error: e.into(),
            };
        }

        self.enter(RestoreRunState::AwaitingPassphrase);
        if passphrase.is_empty() {
            return RestoreOutcome::FailedUnknown {
                snapshot: Some(snapshot),
                error: Error::Precondition("empty passphrase".to_string()),
            };
        }

        self.enter(RestoreRunState::Importing);
        let summary = match self.import_and_swap(download, passphrase).await {
            Ok(summary) => summary,
            Err(error @ Error::Downgrade { .. }) => {
                return RestoreOutcome::FailedDowngrade { snapshot, error }
            }
            Err(error) => {
                return RestoreOutcome::FailedUnknown {
                    snapshot: Some(snapshot),
                    error,
                }
            }
        };

        let ctx = RestoreContext {
            snapshot: &snapshot,
            passphrase,
            database_dir: &self.database_dir,
        };
        let mut failed_hooks = Vec::new();
        for hook in &self.hooks {
            if let Err(e) = hook.after_restore(&ctx).await {
                warn!("Post-restore hook {} failed: {}", hook.name(), e);
                failed_hooks.push(hook.name());
            }
        }

        RestoreOutcome::Restored(RestoreReport {
            snapshot,
            summary,
            database_dir: self.database_dir.clone(),
            failed_hooks,
        })
    }

    async fn import_and_swap(&self, download: &Path, passphrase: &str) -> Result<ImportSummary> {
        let codec = self.codec.clone();
        let download = download.to_path_buf();
        let passphrase = passphrase.to_string();
        let database_dir = self.database_dir.clone();

        run_blocking(move || {
            recover_interrupted_restore(&database_dir)?;
            let fresh = sibling(&database_dir, "restore")?;
            let imported = File::open(&download).map_err(Error::from).and_then(|file| {
                let mut reader = BufReader::new(file);
                Ok(codec.import(&mut reader, &passphrase, &fresh)?)
            });

            let summary = match imported {
                Ok(summary) => summary,
                Err(e) => {
                    remove_dir_quietly(&fresh);
                    return Err(e);
                }
            };

            if let Err(e) = swap_into_place(&fresh, &database_dir) {
                remove_dir_quietly(&fresh);
                return Err(e);
            }
            Ok(summary)
        })
        .await
    }
}

/// Newest snapshot by modification time. Names break ties.
fn newest(listing: Vec<Snapshot>) -> Option<Snapshot> {
    listing.into_iter().max_by(|a, b| {
        a.modified_at
            .cmp(&b.modified_at)
            .then_with(|| a.display_name.cmp(&b.display_name))
    })
}

/// A fresh path next to `dir`: `.<name>.<tag>-<uuid>`.
fn sibling(dir: &Path, tag: &str) -> Result<PathBuf> {
    let parent = dir
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "database".to_string());
    Ok(parent.join(format!(".{}.{}-{}", name, tag, Uuid::new_v4())))
}

/// Replace `target` with `fresh`. The old contents are restored if the second
/// rename fails.
fn swap_into_place(fresh: &Path, target: &Path) -> Result<()> {
    if !target.exists() {
        fs::rename(fresh, target)?;
        return Ok(());
    }

    let aside = sibling(target, "old")?;
    info!("Moving previous database aside to {}", aside.display());
    fs::rename(target, &aside)?;

    if let Err(e) = fs::rename(fresh, target) {
        if let Err(rollback) = fs::rename(&aside, target) {
            warn!(
                "Could not move previous database back from {}: {}",
                aside.display(),
                rollback
            );
        }
        return Err(e.into());
    }

    remove_dir_quietly(&aside);
    Ok(())
}

/// Undo whatever a restore killed mid-swap left next to `database_dir`.
///
/// If the database is missing, the newest set-aside copy is moved back.
/// Remaining set-aside copies and abandoned imports are removed. Returns
/// whether a database was moved back.
pub fn recover_interrupted_restore(database_dir: &Path) -> Result<bool> {
    let parent = database_dir
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if !parent.is_dir() {
        return Ok(false);
    }
    let name = database_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "database".to_string());
    let aside_prefix = format!(".{}.old-", name);
    let import_prefix = format!(".{}.restore-", name);

    let mut aside = Vec::new();
    for entry in fs::read_dir(parent)? {
        let entry = entry?;
        let entry_name = entry.file_name().to_string_lossy().into_owned();
        if entry_name.starts_with(&aside_prefix) {
            let modified = entry.metadata().and_then(|m| m.modified()).ok();
            aside.push((modified, entry.path()));
        } else if entry_name.starts_with(&import_prefix) {
            info!("Removing abandoned import {}", entry.path().display());
            remove_dir_quietly(&entry.path());
        }
    }
    aside.sort();

    let mut recovered = false;
    if !database_dir.exists() {
        if let Some((_, newest)) = aside.pop() {
            warn!(
                "Database missing after an interrupted restore; moving {} back",
                newest.display()
            );
            fs::rename(&newest, database_dir)?;
            recovered = true;
        }
    }
    for (_, stale) in aside {
        info!("Removing previous database {}", stale.display());
        remove_dir_quietly(&stale);
    }
    Ok(recovered)
}

fn remove_dir_quietly(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", dir.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ArchiveCodec, KdfParams};
    use bytes::Bytes;
    use snapvault_storage::ObjectStoreRemote;
    use tempfile::TempDir;

    fn codec(db: &Path) -> Arc<ArchiveCodec> {
        Arc::new(ArchiveCodec::new(db).with_kdf(KdfParams {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }))
    }

    async fn upload_db(
        remote: &ObjectStoreRemote,
        codec: &ArchiveCodec,
        name: &str,
        passphrase: &str,
    ) -> String {
        let mut sealed = Vec::new();
        codec.export(passphrase, &mut sealed).unwrap();
        remote.upload(name, Bytes::from(sealed)).await.unwrap()
    }

    #[test]
    fn test_swap_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("db");
        let fresh = dir.path().join("fresh");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("old.db"), b"old").unwrap();
        fs::create_dir_all(&fresh).unwrap();
        fs::write(fresh.join("new.db"), b"new").unwrap();

        swap_into_place(&fresh, &target).unwrap();

        assert!(target.join("new.db").exists());
        assert!(!target.join("old.db").exists());
        assert!(!fresh.exists());
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_recover_moves_set_aside_database_back() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("db");
        let aside = sibling(&target, "old").unwrap();
        let abandoned = sibling(&target, "restore").unwrap();
        fs::create_dir_all(&aside).unwrap();
        fs::write(aside.join("live.db"), b"live").unwrap();
        fs::create_dir_all(&abandoned).unwrap();
        fs::write(abandoned.join("partial.db"), b"half").unwrap();

        assert!(recover_interrupted_restore(&target).unwrap());

        assert_eq!(fs::read(target.join("live.db")).unwrap(), b"live");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
        assert!(!recover_interrupted_restore(&target).unwrap());
    }

    #[test]
    fn test_recover_drops_leftover_when_database_present() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("db");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("new.db"), b"new").unwrap();
        let aside = sibling(&target, "old").unwrap();
        fs::create_dir_all(&aside).unwrap();
        fs::write(aside.join("old.db"), b"old").unwrap();
        let unrelated = dir.path().join("restore");
        fs::create_dir_all(&unrelated).unwrap();

        assert!(!recover_interrupted_restore(&target).unwrap());

        assert_eq!(fs::read(target.join("new.db")).unwrap(), b"new");
        assert!(!aside.exists());
        assert!(unrelated.exists());
    }

    #[tokio::test]
    async fn test_restore_round_trip() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("messages.db"), b"hello").unwrap();

        let remote = Arc::new(ObjectStoreRemote::in_memory("snapshots"));
        upload_db(&remote, &codec(&source), "backup-2024-01-01-00-00-00.backup", "pw").await;

        let target = dir.path().join("target");
        let staging = dir.path().join("staging");
        let restore = RestoreOrchestrator::new(remote, codec(&target), &target, &staging);

        let info = restore.latest().await.unwrap().unwrap();
        assert_eq!(info.snapshot.display_name, "backup-2024-01-01-00-00-00.backup");
        assert!(info.created_at.is_some());

        match restore.run("pw").await {
            RestoreOutcome::Restored(report) => {
                assert_eq!(report.summary.files, 1);
                assert!(report.failed_hooks.is_empty());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(fs::read(target.join("messages.db")).unwrap(), b"hello");
        assert_eq!(fs::read_dir(&staging).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_wrong_passphrase_keeps_database() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("target");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("live.db"), b"live").unwrap();

        let remote = Arc::new(ObjectStoreRemote::in_memory("snapshots"));
        upload_db(&remote, &codec(&target), "backup-2024-01-01-00-00-00.backup", "right").await;

        let staging = dir.path().join("staging");
        let outcome = RestoreOrchestrator::new(remote, codec(&target), &target, &staging)
            .run("wrong")
            .await;

        assert_eq!(outcome.state(), RestoreRunState::FailedUnknown);
        assert!(outcome.should_reprompt());
        assert_eq!(fs::read(target.join("live.db")).unwrap(), b"live");
        assert_eq!(fs::read_dir(&staging).unwrap().count(), 0);

        // Only the target and staging dirs remain; no half-imported sibling.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_empty_passphrase() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source");
        fs::create_dir_all(&source).unwrap();

        let remote = Arc::new(ObjectStoreRemote::in_memory("snapshots"));
        upload_db(&remote, &codec(&source), "a.backup", "pw").await;

        let outcome = RestoreOrchestrator::new(
            remote,
            codec(&source),
            dir.path().join("target"),
            dir.path().join("staging"),
        )
        .run("")
        .await;

        assert_eq!(outcome.state(), RestoreRunState::FailedUnknown);
        assert!(outcome.should_reprompt());
    }
}
