//! Error taxonomy for snapshot operations

use std::path::PathBuf;

use crate::storage::StorageError;

/// Result type for snapshot operations
pub type Result<T> = std::result::Result<T, GibError>;

/// Errors surfaced by gib commands
#[derive(Debug, thiserror::Error)]
pub enum GibError {
    /// Malformed arguments (bad names, empty path list, ...)
    #[error("{0}")]
    Usage(String),

    #[error("Path '{}' does not exist, cannot backup", .0.display())]
    PathNotFound(PathBuf),

    #[error("Multiple paths ending in '{0}' are being backed up, not supported")]
    DuplicateBasename(String),

    #[error("Snapshot {snapshot} for backup {backup} does not exist")]
    RefNotFound { backup: String, snapshot: String },

    #[error("Destination '{}' already exists - cannot extract!", .0.display())]
    DestinationExists(PathBuf),

    /// A snapshot with the generated timestamp name is already recorded
    #[error("Snapshot {0} already exists, refusing to overwrite it")]
    SnapshotExists(String),

    #[error("No gib store at '{}' (run `gib init` first)", .0.display())]
    NotInitialized(PathBuf),

    #[error("Storage error: {0}")]
    Backend(#[from] StorageError),
}

impl From<std::io::Error> for GibError {
    fn from(e: std::io::Error) -> Self {
        GibError::Backend(StorageError::Io(e))
    }
}

impl From<walkdir::Error> for GibError {
    fn from(e: walkdir::Error) -> Self {
        GibError::Backend(StorageError::Io(e.into()))
    }
}
