//! Error types for the watch-set side of the system.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from watcher and reconciliation operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("Cannot unwatch path {path}: {reason}")]
    PathUnwatchFailed { path: PathBuf, reason: String },

    #[error("Failed to create unit file {path}: {source}")]
    FileCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove unit file {path}: {source}")]
    FileRemove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid unit name '{name}': must be a plain file name")]
    InvalidUnitName { name: String },
}

impl From<std::io::Error> for WatchError {
    fn from(e: std::io::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}
