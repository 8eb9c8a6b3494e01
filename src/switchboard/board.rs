//! The switchboard: reference counts and producer lifecycles.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::OpenOptions;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::SwitchboardError;
use super::notification::{Notification, NotificationSource, Operation};
use super::producer::{ActivationId, DEFAULT_TICK, Producer, ProducerSummary};

/// Opens attributed to the producer's own append handle.
///
/// The producer's handle is observed by the notification source like any
/// other open, so a path is only idle once its count drops to this value,
/// not to zero. With several external readers on one path the count can
/// reach this value early or late depending on event interleaving; the rule
/// is kept as is.
pub const PRODUCER_OWN_OPENS: usize = 1;

/// Outcome of handling one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// First open: a producer was started and the count recorded.
    /// `previous` is the summary of the activation that had to finish
    /// closing the file first, if one was still retiring.
    Started {
        id: ActivationId,
        count: usize,
        previous: Option<ProducerSummary>,
    },
    /// Open on a path that already has a producer.
    Counted { count: usize },
    /// Close that left the count above the idle threshold.
    Released { count: usize },
    /// Close that reached the idle threshold; the producer was told to stop
    /// and both entries were removed.
    Stopping { id: ActivationId, remaining: usize },
    /// Close with no producer recorded; any leftover count was dropped.
    Ignored { stale_count: Option<usize> },
    /// The file could not be opened; nothing was recorded.
    OpenFailed,
}

struct ProducerHandle {
    id: ActivationId,
    stop_tx: mpsc::Sender<()>,
    task: JoinHandle<ProducerSummary>,
}

/// A producer that has been told to stop but may still be truncating.
struct Retiring {
    id: ActivationId,
    task: JoinHandle<ProducerSummary>,
}

/// Single consumer of the notification stream.
///
/// Owns the open counts and producer handles exclusively; every mutation
/// goes through [`Switchboard::handle`], so no locking is involved.
pub struct Switchboard {
    open_counts: HashMap<PathBuf, usize>,
    producers: HashMap<PathBuf, ProducerHandle>,
    retiring: HashMap<PathBuf, Retiring>,
    next_activation: u64,
    tick: Duration,
}

impl Switchboard {
    pub fn new() -> Self {
        Self {
            open_counts: HashMap::new(),
            producers: HashMap::new(),
            retiring: HashMap::new(),
            next_activation: 1,
            tick: DEFAULT_TICK,
        }
    }

    /// Set the producer record interval.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Consume notifications in arrival order until the source ends or
    /// `shutdown` fires, then stop and join every producer.
    pub async fn run<S>(&mut self, source: &mut S, shutdown: &CancellationToken)
    where
        S: NotificationSource + ?Sized,
    {
        crate::log_event!("switchboard", "started");

        loop {
            let next = tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    crate::log_event!("switchboard", "shutdown requested");
                    break;
                }

                next = source.next() => next,
            };

            let Some(notification) = next else {
                tracing::warn!("[switchboard] notification stream closed");
                break;
            };

            let transition = self.handle(notification.clone()).await;
            crate::debug_event!(
                "switchboard",
                "handled",
                "{:?} {} -> {transition:?}",
                notification.op,
                notification.path.display()
            );
        }

        self.drain().await;
        crate::log_event!("switchboard", "stopped");
    }

    /// Apply a single notification.
    pub async fn handle(&mut self, notification: Notification) -> Transition {
        match notification.op {
            Operation::Open => self.on_open(notification.path).await,
            Operation::Close => self.on_close(&notification.path),
        }
    }

    async fn on_open(&mut self, path: PathBuf) -> Transition {
        if self.producers.contains_key(&path) {
            let count = self.increment(&path);
            return Transition::Counted { count };
        }

        // A previous activation may still be truncating this file.
        let previous = self.join_retired(&path).await;

        let file = match OpenOptions::new().append(true).open(&path).await {
            Ok(file) => file,
            Err(source) => {
                let e = SwitchboardError::FileOpen {
                    path: path.clone(),
                    source,
                };
                tracing::error!("[switchboard] {e}");
                return Transition::OpenFailed;
            }
        };

        let id = ActivationId(self.next_activation);
        self.next_activation += 1;

        let (stop_tx, stop_rx) = mpsc::channel(1);
        let producer = Producer::new(id, path.clone(), file, stop_rx, self.tick);
        let task = tokio::spawn(producer.run());

        // Registered before counting so an immediate close finds it.
        self.producers
            .insert(path.clone(), ProducerHandle { id, stop_tx, task });
        let count = self.increment(&path);

        crate::log_event!("switchboard", "producer started", "{id} for {}", path.display());
        Transition::Started {
            id,
            count,
            previous,
        }
    }

    fn on_close(&mut self, path: &Path) -> Transition {
        if !self.producers.contains_key(path) {
            // Our own producer closing, a duplicate, or a close we never saw open.
            let stale_count = self.open_counts.remove(path);
            return Transition::Ignored { stale_count };
        }

        let count = self.open_counts.entry(path.to_path_buf()).or_insert(0);
        *count = count.saturating_sub(1);
        let remaining = *count;

        if remaining > PRODUCER_OWN_OPENS {
            return Transition::Released { count: remaining };
        }

        self.open_counts.remove(path);
        let Some(handle) = self.producers.remove(path) else {
            return Transition::Ignored { stale_count: None };
        };
        let id = handle.id;
        self.retire(path.to_path_buf(), handle);

        crate::log_event!("switchboard", "producer stopping", "{id} for {}", path.display());
        Transition::Stopping { id, remaining }
    }

    fn increment(&mut self, path: &Path) -> usize {
        let count = self.open_counts.entry(path.to_path_buf()).or_insert(0);
        *count += 1;
        *count
    }

    fn retire(&mut self, path: PathBuf, handle: ProducerHandle) {
        // Fresh capacity-1 channel and the handle is dropped right after,
        // so this is the only signal the producer will ever receive.
        if handle.stop_tx.try_send(()).is_err() {
            tracing::warn!("[switchboard] {} already exited", handle.id);
        }

        self.retiring.retain(|_, r| !r.task.is_finished());
        self.retiring.insert(
            path,
            Retiring {
                id: handle.id,
                task: handle.task,
            },
        );
    }

    /// Wait for a stopped producer on `path` to finish truncating and
    /// closing its file. Returns `None` if none is pending.
    pub async fn join_retired(&mut self, path: &Path) -> Option<ProducerSummary> {
        let retiring = self.retiring.remove(path)?;
        join_producer(retiring.id, retiring.task).await
    }

    /// Stop every running producer and wait for all of them to close.
    pub async fn drain(&mut self) {
        let running: Vec<(PathBuf, ProducerHandle)> = self.producers.drain().collect();
        for (path, handle) in running {
            self.retire(path, handle);
        }
        self.open_counts.clear();

        let pending: Vec<Retiring> = self.retiring.drain().map(|(_, r)| r).collect();
        if !pending.is_empty() {
            crate::log_event!("switchboard", "draining", "{} producers", pending.len());
        }
        for retiring in pending {
            join_producer(retiring.id, retiring.task).await;
        }
    }

    /// Current inferred open count for a path.
    pub fn open_count(&self, path: &Path) -> Option<usize> {
        self.open_counts.get(path).copied()
    }

    /// Whether a producer is currently registered for a path.
    pub fn is_producing(&self, path: &Path) -> bool {
        self.producers.contains_key(path)
    }

    /// Activation id of the running producer for a path.
    pub fn activation(&self, path: &Path) -> Option<ActivationId> {
        self.producers.get(path).map(|h| h.id)
    }

    /// Number of registered producers.
    pub fn active_producers(&self) -> usize {
        self.producers.len()
    }
}

impl Default for Switchboard {
    fn default() -> Self {
        Self::new()
    }
}

async fn join_producer(
    id: ActivationId,
    task: JoinHandle<ProducerSummary>,
) -> Option<ProducerSummary> {
    match task.await {
        Ok(summary) => Some(summary),
        Err(e) => {
            tracing::error!("[switchboard] {id} terminated abnormally: {e}");
            None
        }
    }
}
