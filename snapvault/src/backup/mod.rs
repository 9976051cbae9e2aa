//! Backup runs and the queue that schedules them.

mod cancel;
mod orchestrator;
mod queue;
mod types;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use orchestrator::{BackupOrchestrator, Clock};
pub use queue::{BackupQueue, JobHandle, RunConstraint, ToggleConstraint, Unconstrained};
pub use types::{BackupOutcome, BackupReport, BackupRunState};
