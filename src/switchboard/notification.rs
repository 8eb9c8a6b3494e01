//! Inbound open/close notifications and the sources that yield them.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// What happened to a watched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Open,
    Close,
}

/// A single (operation, path) event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub op: Operation,
    pub path: PathBuf,
}

impl Notification {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            op: Operation::Open,
            path: path.into(),
        }
    }

    pub fn close(path: impl Into<PathBuf>) -> Self {
        Self {
            op: Operation::Close,
            path: path.into(),
        }
    }
}

/// A lazy, non-restartable stream of notifications.
///
/// Events for a single path arrive in the order the opens and closes
/// happened. Nothing is promised across paths, and duplicates are allowed.
/// `None` means the stream has ended for good.
#[async_trait]
pub trait NotificationSource: Send {
    async fn next(&mut self) -> Option<Notification>;
}

/// Notification source fed from an in-process channel.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<Notification>,
}

impl ChannelSource {
    /// Create a source together with the sender that feeds it.
    pub fn new(capacity: usize) -> (mpsc::Sender<Notification>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

#[async_trait]
impl NotificationSource for ChannelSource {
    async fn next(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }
}
