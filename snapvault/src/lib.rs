pub mod backup;
pub mod codec;
pub mod config;
pub mod error;
pub mod restore;
pub mod retention;
pub mod settings;
pub mod staging;
pub mod status;

pub use config::Config;
pub use error::{Error, FailureClass, Result};

pub use snapvault_storage::{RemoteStore, SerialRemote, Snapshot};

/// Run file work on the blocking pool.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
}
