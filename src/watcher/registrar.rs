//! Watch registration seam between the synchronizer and the event backend.

use std::path::Path;

use super::WatchError;

/// Registers and removes per-file watches.
///
/// Implemented by [`WatchHandle`](super::WatchHandle) for the inotify
/// backend; tests substitute an in-memory recorder.
pub trait WatchRegistrar: Send {
    /// Start delivering open/close events for `path`.
    fn watch(&mut self, path: &Path) -> Result<(), WatchError>;

    /// Stop delivering events for `path`.
    fn unwatch(&mut self, path: &Path) -> Result<(), WatchError>;
}
