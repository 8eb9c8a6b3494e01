//! Notification source backed directly by Linux inotify.
//!
//! Every unit file gets its own watch with `IN_OPEN | IN_CLOSE`, so both
//! `IN_CLOSE_WRITE` and `IN_CLOSE_NOWRITE` arrive. Readers only ever open
//! files read-only, which makes the no-write close the one that matters.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use inotify::{EventMask, EventStream, Inotify, WatchDescriptor, WatchMask, Watches};
use parking_lot::Mutex;

use super::error::WatchError;
use super::registrar::WatchRegistrar;
use crate::switchboard::{Notification, NotificationSource, Operation};

/// Default number of events one read of the inotify descriptor can hold.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Space for one `inotify_event` header plus a maximal file name.
const EVENT_BYTES: usize = 16 + 256;

/// Map an inotify event mask to the operation the switchboard counts.
///
/// Both close flavours count as a close.
pub fn classify(mask: EventMask) -> Option<Operation> {
    if mask.contains(EventMask::OPEN) {
        Some(Operation::Open)
    } else if mask.intersects(EventMask::CLOSE_WRITE | EventMask::CLOSE_NOWRITE) {
        Some(Operation::Close)
    } else {
        None
    }
}

/// Watch descriptors and the paths they were registered for.
#[derive(Default)]
struct WatchTable {
    by_wd: HashMap<WatchDescriptor, PathBuf>,
    by_path: HashMap<PathBuf, WatchDescriptor>,
}

impl WatchTable {
    fn insert(&mut self, path: PathBuf, wd: WatchDescriptor) {
        self.by_wd.insert(wd.clone(), path.clone());
        self.by_path.insert(path, wd);
    }

    /// Forget a descriptor the kernel has dropped.
    fn forget(&mut self, wd: &WatchDescriptor) {
        if let Some(path) = self.by_wd.remove(wd)
            && self.by_path.get(&path) == Some(wd)
        {
            self.by_path.remove(&path);
        }
    }
}

/// Open/close notifications for every watched unit file.
///
/// The stream never ends on its own; the switchboard stops reading it on
/// shutdown.
pub struct InotifySource {
    stream: EventStream<Vec<u8>>,
    table: Arc<Mutex<WatchTable>>,
}

impl InotifySource {
    /// Create the inotify instance and a handle for registering watches.
    ///
    /// Must be called from inside a tokio runtime. `capacity` sizes the read
    /// buffer in events.
    pub fn new(capacity: usize) -> Result<(Self, WatchHandle), WatchError> {
        let inotify = Inotify::init()?;
        let buffer = vec![0u8; capacity.max(1) * EVENT_BYTES];
        let stream = inotify.into_event_stream(buffer)?;

        let table = Arc::new(Mutex::new(WatchTable::default()));
        let handle = WatchHandle {
            watches: stream.watches(),
            table: Arc::clone(&table),
        };

        Ok((Self { stream, table }, handle))
    }
}

#[async_trait]
impl NotificationSource for InotifySource {
    async fn next(&mut self) -> Option<Notification> {
        loop {
            let event = match self.stream.next().await? {
                Ok(event) => event,
                Err(e) => {
                    tracing::error!("[watcher] inotify read failed: {e}");
                    continue;
                }
            };

            if event.mask.contains(EventMask::Q_OVERFLOW) {
                tracing::warn!("[watcher] inotify queue overflowed, events were lost");
                continue;
            }

            if event.mask.contains(EventMask::IGNORED) {
                self.table.lock().forget(&event.wd);
                continue;
            }

            let Some(path) = self.table.lock().by_wd.get(&event.wd).cloned() else {
                tracing::trace!("[watcher] event for unknown watch: {:?}", event.mask);
                continue;
            };

            if let Some(op) = classify(event.mask) {
                return Some(Notification { op, path });
            }
        }
    }
}

/// Registers and removes per-file watches on the shared inotify instance.
#[derive(Clone)]
pub struct WatchHandle {
    watches: Watches,
    table: Arc<Mutex<WatchTable>>,
}

impl WatchHandle {
    /// Whether `path` currently has a watch.
    pub fn is_watching(&self, path: &Path) -> bool {
        self.table.lock().by_path.contains_key(path)
    }
}

impl WatchRegistrar for WatchHandle {
    fn watch(&mut self, path: &Path) -> Result<(), WatchError> {
        let wd = self
            .watches
            .add(path, WatchMask::OPEN | WatchMask::CLOSE)
            .map_err(|e| WatchError::PathWatchFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        self.table.lock().insert(path.to_path_buf(), wd);
        crate::debug_event!("watcher", "watching", "{}", path.display());
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> Result<(), WatchError> {
        let wd = {
            let mut table = self.table.lock();
            let wd = table
                .by_path
                .remove(path)
                .ok_or_else(|| WatchError::PathUnwatchFailed {
                    path: path.to_path_buf(),
                    reason: "not watched".to_string(),
                })?;
            table.by_wd.remove(&wd);
            wd
        };

        self.watches
            .remove(wd)
            .map_err(|e| WatchError::PathUnwatchFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        crate::debug_event!("watcher", "unwatched", "{}", path.display());
        Ok(())
    }
}
