use snapvault_storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

use crate::codec::CodecError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backup file already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Remote error: {0}")]
    Remote(#[from] StorageError),

    #[error("Snapshot schema {found} is newer than supported schema {supported}")]
    Downgrade { found: u32, supported: u32 },

    #[error("Snapshot is corrupt or the passphrase is wrong: {0}")]
    Corrupt(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<CodecError> for Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Downgrade { found, supported } => Error::Downgrade { found, supported },
            CodecError::Corrupt(msg) => Error::Corrupt(msg),
            CodecError::Io(e) => Error::Io(e),
        }
    }
}

/// User-facing failure category. Every error maps to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Precondition,
    Io,
    Remote,
    Downgrade,
    Corrupt,
    Cancelled,
}

impl FailureClass {
    pub fn user_message(&self) -> &'static str {
        match self {
            FailureClass::Precondition => {
                "Backups are not set up: check the backup directory and passphrase"
            }
            FailureClass::Io => "A local file operation failed",
            FailureClass::Remote => "The remote store could not be reached",
            FailureClass::Downgrade => {
                "This backup was made by a newer version and cannot be restored here"
            }
            FailureClass::Corrupt => "Incorrect passphrase or damaged backup",
            FailureClass::Cancelled => "The run was cancelled",
        }
    }

    /// Whether asking for the passphrase again could help.
    pub fn should_reprompt(&self) -> bool {
        matches!(self, FailureClass::Corrupt)
    }
}

impl Error {
    pub fn class(&self) -> FailureClass {
        match self {
            Error::Precondition(_) | Error::Config(_) => FailureClass::Precondition,
            Error::Io(_) | Error::AlreadyExists(_) | Error::Json(_) => FailureClass::Io,
            Error::Remote(_) => FailureClass::Remote,
            Error::Downgrade { .. } => FailureClass::Downgrade,
            Error::Corrupt(_) => FailureClass::Corrupt,
            Error::Cancelled => FailureClass::Cancelled,
        }
    }
}
