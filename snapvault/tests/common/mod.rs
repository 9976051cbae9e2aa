//! Shared fixtures for the backup and restore integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use snapvault::backup::{BackupOrchestrator, Clock};
use snapvault::codec::{ArchiveCodec, KdfParams, SnapshotCodec};
use snapvault::config::BackupConfig;
use snapvault_storage::{RemoteStore, Snapshot, StorageError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub const PASSPHRASE: &str = "correct horse battery staple";

pub fn fast_kdf() -> KdfParams {
    KdfParams {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    }
}

pub fn codec(db: &Path) -> Arc<ArchiveCodec> {
    Arc::new(ArchiveCodec::new(db).with_kdf(fast_kdf()))
}

pub fn at(day: u32, secs: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, day, 12, 0, secs).unwrap()
}

pub fn fixed_clock(when: DateTime<Utc>) -> Clock {
    Arc::new(move || when)
}

/// Directory layout of one device.
pub struct Device {
    pub root: TempDir,
    pub backups: PathBuf,
    pub db: PathBuf,
    pub staging: PathBuf,
}

impl Device {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let backups = root.path().join("backups");
        let db = root.path().join("db");
        let staging = root.path().join("restore");
        std::fs::create_dir_all(&backups).unwrap();
        std::fs::create_dir_all(&db).unwrap();
        Self {
            root,
            backups,
            db,
            staging,
        }
    }

    pub fn with_db_file(self, name: &str, contents: &[u8]) -> Self {
        std::fs::write(self.db.join(name), contents).unwrap();
        self
    }

    pub fn backup_config(&self) -> BackupConfig {
        BackupConfig {
            dir: Some(self.backups.clone()),
            ..Default::default()
        }
    }

    pub fn orchestrator(&self, remote: Arc<dyn RemoteStore>) -> BackupOrchestrator {
        BackupOrchestrator::new(self.backup_config(), remote, codec(&self.db))
            .with_passphrase(PASSPHRASE)
    }

    pub fn backup_entries(&self) -> Vec<String> {
        list_names(&self.backups)
    }
}

pub fn list_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Seal the codec's database the way a backup run would.
pub fn seal(codec: &dyn SnapshotCodec) -> Bytes {
    let mut out = Vec::new();
    codec.export(PASSPHRASE, &mut out).unwrap();
    Bytes::from(out)
}

/// In-memory remote whose modification times are chosen by the test.
#[derive(Default)]
pub struct FakeRemote {
    objects: Mutex<Vec<(Snapshot, Bytes)>>,
    next_id: AtomicU64,
    pub fail_list: AtomicBool,
    pub fail_upload: AtomicBool,
    pub fail_download: AtomicBool,
    /// When set, every upload also drops a file with the uploaded name into
    /// this directory, as another writer racing the run would.
    pub collide_in: Mutex<Option<PathBuf>>,
    pub deletes: AtomicU64,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert an object directly with a given modification time.
    pub fn seed(&self, name: &str, modified_at: DateTime<Utc>, data: Bytes) -> String {
        let id = format!("seed-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.objects.lock().push((
            Snapshot {
                id: id.clone(),
                display_name: name.to_string(),
                size_bytes: data.len() as u64,
                modified_at,
                location: format!("fake://{}/{}", id, name),
            },
            data,
        ));
        id
    }

    pub fn ids(&self) -> Vec<String> {
        self.objects.lock().iter().map(|(s, _)| s.id.clone()).collect()
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn list(&self) -> snapvault_storage::Result<Vec<Snapshot>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("listing unavailable".to_string()));
        }
        let mut listing: Vec<_> = self.objects.lock().iter().map(|(s, _)| s.clone()).collect();
        listing.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        Ok(listing)
    }

    async fn upload(&self, display_name: &str, data: Bytes) -> snapvault_storage::Result<String> {
        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("connection reset".to_string()));
        }
        if let Some(dir) = self.collide_in.lock().as_ref() {
            std::fs::write(dir.join(display_name), b"another writer")?;
        }
        Ok(self.seed(display_name, Utc::now(), data))
    }

    async fn delete(&self, id: &str) -> snapvault_storage::Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().retain(|(s, _)| s.id != id);
        Ok(())
    }

    async fn download(
        &self,
        id: &str,
        display_name: &str,
        dest: &Path,
    ) -> snapvault_storage::Result<u64> {
        if self.fail_download.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("download interrupted".to_string()));
        }
        let data = self
            .objects
            .lock()
            .iter()
            .find(|(s, _)| s.id == id && s.display_name == display_name)
            .map(|(_, d)| d.clone())
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", id, display_name)))?;
        tokio::fs::write(dest, &data).await?;
        Ok(data.len() as u64)
    }

    fn backend_name(&self) -> &'static str {
        "fake"
    }
}
