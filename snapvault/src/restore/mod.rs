//! Restoring the newest remote snapshot into a fresh database.

mod hooks;
mod orchestrator;
mod types;

pub use hooks::{EnableScheduledBackups, PostRestoreHook, RememberPassphrase, RestoreContext};
pub use orchestrator::{recover_interrupted_restore, RestoreOrchestrator};
pub use types::{BackupInfo, RestoreOutcome, RestoreReport, RestoreRunState};
