//! Error types for the switchboard core and its producers.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while driving a unit's file.
///
/// None of these are fatal to the event loop; they are logged where they
/// occur and the loop moves on to the next event or tick.
#[derive(Error, Debug)]
pub enum SwitchboardError {
    #[error("Failed to open {path} for appending: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write record to {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to truncate {path}: {source}")]
    FileTruncate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
