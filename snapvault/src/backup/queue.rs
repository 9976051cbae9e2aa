//! The backup job queue.
//!
//! At most one backup job exists at a time. An unforced request joins the
//! current job if there is one, otherwise it waits for the [`RunConstraint`]
//! before running. A forced request cancels the current job, waits for it to
//! settle, and starts a new run right away.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use super::cancel::{cancel_pair, CancelHandle};
use super::orchestrator::BackupOrchestrator;
use super::types::{BackupOutcome, BackupRunState};
use crate::error::Error;

/// Gate for unforced runs, e.g. "device is charging".
#[async_trait]
pub trait RunConstraint: Send + Sync {
    /// Resolves once an unforced run may start.
    async fn satisfied(&self);
}

/// Always satisfied.
pub struct Unconstrained;

#[async_trait]
impl RunConstraint for Unconstrained {
    async fn satisfied(&self) {}
}

/// A constraint flipped from outside, e.g. by a power-state listener.
pub struct ToggleConstraint {
    tx: watch::Sender<bool>,
}

impl ToggleConstraint {
    pub fn new(met: bool) -> Self {
        let (tx, _rx) = watch::channel(met);
        Self { tx }
    }

    pub fn set(&self, met: bool) {
        self.tx.send_replace(met);
    }

    pub fn is_met(&self) -> bool {
        *self.tx.borrow()
    }
}

#[async_trait]
impl RunConstraint for ToggleConstraint {
    async fn satisfied(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as self, so this only returns once met.
        let _ = rx.wait_for(|met| *met).await;
    }
}

type OutcomeSlot = watch::Receiver<Option<Arc<BackupOutcome>>>;

struct ActiveJob {
    id: u64,
    cancel: CancelHandle,
    done: OutcomeSlot,
}

impl ActiveJob {
    fn is_finished(&self) -> bool {
        self.done.borrow().is_some()
    }
}

/// Handle to a queued or running backup job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: u64,
    coalesced: bool,
    done: OutcomeSlot,
}

impl JobHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether this request joined a job that was already queued or running.
    pub fn was_coalesced(&self) -> bool {
        self.coalesced
    }

    /// Wait for the job's outcome.
    pub async fn outcome(&self) -> Arc<BackupOutcome> {
        let mut done = self.done.clone();
        let outcome = match done.wait_for(|o| o.is_some()).await {
            Ok(slot) => match &*slot {
                Some(outcome) => outcome.clone(),
                None => aborted(),
            },
            Err(_) => aborted(),
        };
        outcome
    }
}

fn aborted() -> Arc<BackupOutcome> {
    Arc::new(BackupOutcome::Failed {
        at: BackupRunState::Idle,
        error: Error::Io(std::io::Error::other("backup task stopped without an outcome")),
    })
}

pub struct BackupQueue {
    orchestrator: Arc<BackupOrchestrator>,
    constraint: Arc<dyn RunConstraint>,
    active: Arc<Mutex<Option<ActiveJob>>>,
    next_id: AtomicU64,
}

impl BackupQueue {
    pub fn new(orchestrator: BackupOrchestrator, constraint: Arc<dyn RunConstraint>) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            constraint,
            active: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Whether a job is queued or running.
    pub async fn is_busy(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|job| !job.is_finished())
            .unwrap_or(false)
    }

    /// Request a backup.
    pub async fn enqueue(&self, force: bool) -> JobHandle {
        let mut active = self.active.lock().await;

        if active.as_ref().map(ActiveJob::is_finished).unwrap_or(false) {
            *active = None;
        }

        if let Some(job) = active.as_ref() {
            if !force {
                debug!(job = job.id, "Backup request joined the current job");
                return JobHandle {
                    id: job.id,
                    coalesced: true,
                    done: job.done.clone(),
                };
            }

            info!(job = job.id, "Forced backup cancels the current job");
            job.cancel.cancel();
            let mut done = job.done.clone();
            let _ = done.wait_for(|o| o.is_some()).await;
            *active = None;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (cancel, signal) = cancel_pair();
        let (tx, done) = watch::channel(None);

        let orchestrator = self.orchestrator.clone();
        let constraint = self.constraint.clone();
        let slot = self.active.clone();

        tokio::spawn(async move {
            let outcome = if force {
                orchestrator.run_with_cancel(&signal).await
            } else {
                tokio::select! {
                    _ = constraint.satisfied() => orchestrator.run_with_cancel(&signal).await,
                    _ = signal.cancelled() => {
                        debug!(job = id, "Deferred backup cancelled before it started");
                        let outcome = BackupOutcome::Failed {
                            at: BackupRunState::Idle,
                            error: Error::Cancelled,
                        };
                        orchestrator.observer().on_backup_finished(&outcome);
                        outcome
                    }
                }
            };

            let _ = tx.send(Some(Arc::new(outcome)));

            let mut slot = slot.lock().await;
            if slot.as_ref().map(|job| job.id) == Some(id) {
                *slot = None;
            }
        });

        debug!(job = id, force, "Backup job queued");
        *active = Some(ActiveJob {
            id,
            cancel,
            done: done.clone(),
        });

        JobHandle {
            id,
            coalesced: false,
            done,
        }
    }
}
