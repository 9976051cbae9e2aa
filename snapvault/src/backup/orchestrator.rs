//! One backup run, start to finish.
//!
//! ```text
//! Idle → Staging → Exporting → Uploading → Retiring → Committing → Succeeded
//!   └──────────────────────── any ─────────────────────────────→ Failed
//! ```
//!
//! The snapshot is only renamed to its canonical name after the upload and
//! retention pass, so a committed local file always has a remote twin.
//! Whatever happens, the run's temp file is gone when the run returns.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use snapvault_storage::{RemoteStore, Snapshot};
use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::cancel::CancelSignal;
use super::types::{BackupOutcome, BackupReport, BackupRunState};
use crate::codec::SnapshotCodec;
use crate::config::BackupConfig;
use crate::error::{Error, Result};
use crate::retention::{RetentionManager, RetentionReport};
use crate::run_blocking;
use crate::staging::{LocalStaging, StagingLock, TempFile};
use crate::status::{NoopObserver, RunObserver};

/// Source of "now" for canonical file names.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct BackupOrchestrator {
    config: BackupConfig,
    remote: Arc<dyn RemoteStore>,
    codec: Arc<dyn SnapshotCodec>,
    passphrase: Option<String>,
    observer: Arc<dyn RunObserver>,
    clock: Clock,
}

/// Per-run state that must be unwound on every exit path.
struct RunTracker<'a> {
    state: BackupRunState,
    observer: &'a dyn RunObserver,
    staging: Option<LocalStaging>,
    lock: Option<StagingLock>,
    temp: Option<TempFile>,
}

impl RunTracker<'_> {
    fn enter(&mut self, state: BackupRunState) {
        debug!(from = %self.state, to = %state, "backup transition");
        self.state = state;
        self.observer.on_backup_state(state);
    }
}

impl BackupOrchestrator {
    pub fn new(
        config: BackupConfig,
        remote: Arc<dyn RemoteStore>,
        codec: Arc<dyn SnapshotCodec>,
    ) -> Self {
        Self {
            config,
            remote,
            codec,
            passphrase: None,
            observer: Arc::new(NoopObserver),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn observer(&self) -> &Arc<dyn RunObserver> {
        &self.observer
    }

    /// Run one backup to completion.
    pub async fn run(&self) -> BackupOutcome {
        self.run_with_cancel(&CancelSignal::never()).await
    }

    /// Run one backup, honouring `cancel` up to the start of the upload.
    #[instrument(skip(self, cancel), fields(backend = self.remote.backend_name()))]
    pub async fn run_with_cancel(&self, cancel: &CancelSignal) -> BackupOutcome {
        let mut run = RunTracker {
            state: BackupRunState::Idle,
            observer: self.observer.as_ref(),
            staging: None,
            lock: None,
            temp: None,
        };

        let result = self.execute(&mut run, cancel).await;

        if let (Some(staging), Some(temp)) = (run.staging.take(), run.temp.take()) {
            let cleaned = run_blocking(move || {
                staging.cleanup(&temp);
                Ok(())
            })
            .await;
            if let Err(e) = cleaned {
                warn!("Temp file cleanup did not run: {}", e);
            }
        }
        // Released only once the temp file is gone.
        if let Some(lock) = run.lock.take() {
            debug!("Releasing {}", lock.path().display());
        }

        let outcome = match result {
            Ok(report) => {
                run.enter(BackupRunState::Succeeded);
                BackupOutcome::Succeeded(report)
            }
            Err(error) => {
                let at = run.state;
                run.enter(BackupRunState::Failed);
                BackupOutcome::Failed { at, error }
            }
        };

        self.observer.on_backup_finished(&outcome);
        outcome
    }

    async fn execute(&self, run: &mut RunTracker<'_>, cancel: &CancelSignal) -> Result<BackupReport> {
        // Precondition: nothing is touched until these pass.
        let staging = LocalStaging::from_config(&self.config)?;
        if !staging.is_writable() {
            return Err(Error::Precondition(format!(
                "backup directory {} is missing or not writable",
                staging.dir().display()
            )));
        }
        let passphrase = match &self.passphrase {
            Some(p) if !p.is_empty() => p.clone(),
            _ => return Err(Error::Precondition("no backup passphrase set".to_string())),
        };
        // A concurrent run would purge this run's temp file as stale.
        let lock = {
            let staging = staging.clone();
            run_blocking(move || staging.try_lock()).await?
        };
        run.lock = Some(lock);
        run.staging = Some(staging.clone());

        cancel.check()?;
        run.enter(BackupRunState::Staging);
        let now = (self.clock)();
        let file_name = staging.canonical_name(now);

        let purged = {
            let staging = staging.clone();
            run_blocking(move || Ok(staging.purge_stale_temp_files())).await?
        };
        if purged > 0 {
            info!("Removed {} stale temp file(s) from an earlier run", purged);
        }
        if staging.exists(&file_name) {
            return Err(Error::AlreadyExists(staging.dir().join(&file_name)));
        }

        cancel.check()?;
        run.enter(BackupRunState::Exporting);
        let temp = {
            let staging = staging.clone();
            run_blocking(move || staging.create_temp_file()).await?
        };
        run.temp = Some(temp.clone());

        let size_bytes = {
            let codec = self.codec.clone();
            let path = temp.path.clone();
            run_blocking(move || {
                let mut writer = BufWriter::new(File::create(&path)?);
                let written = codec.export(&passphrase, &mut writer)?;
                let file = writer.into_inner().map_err(|e| e.into_error())?;
                file.sync_all()?;
                Ok(written)
            })
            .await?
        };
        let schema_version = self.codec.schema_version();
        debug!(
            schema = schema_version,
            "Exported {} bytes to {}", size_bytes, temp.name
        );

        cancel.check()?;
        run.enter(BackupRunState::Uploading);
        let data = tokio::fs::read(&temp.path).await?;
        let remote_id = self.remote.upload(&file_name, Bytes::from(data)).await?;
        info!("Uploaded {} as {}", file_name, remote_id);

        run.enter(BackupRunState::Retiring);
        let retention = match RetentionManager::new(self.remote.clone())
            .retire_all_except(&remote_id)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                // Left for the next run's retention pass.
                warn!("Could not list remote snapshots for retention: {}", e);
                RetentionReport::default()
            }
        };

        run.enter(BackupRunState::Committing);
        let committed = {
            let staging = staging.clone();
            let temp = temp.clone();
            let file_name = file_name.clone();
            run_blocking(move || staging.commit(&temp, &file_name)).await?
        };
        run.temp = None;

        let size_on_disk = tokio::fs::metadata(&committed).await?.len();
        let local = Snapshot::local(&committed, size_on_disk, now);

        let keep = self.config.local_keep;
        let pruned_local = run_blocking(move || Ok(staging.prune_canonical(keep))).await?;

        Ok(BackupReport {
            remote_id,
            file_name,
            local,
            size_bytes,
            schema_version,
            retention,
            pruned_local,
        })
    }
}
