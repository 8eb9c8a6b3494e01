//! Background task that pumps timestamped records into a unit's file.
//!
//! A producer owns the append handle from the moment the switchboard opens
//! it until the producer observes its stop signal. On stop it truncates the
//! file to zero length and closes the handle, in that order, so readers that
//! reopen the file later never see output from a previous activation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use super::SwitchboardError;

/// Default interval between two records.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Identifies one activation of a producer.
///
/// A path that is opened, released and opened again gets a fresh id, which
/// makes the records of each activation distinguishable in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActivationId(pub u64);

impl fmt::Display for ActivationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "producer-{:04}", self.0)
    }
}

/// What a producer did before it terminated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducerSummary {
    pub records_written: u64,
    pub write_failures: u64,
    /// False only when the final truncate failed.
    pub truncated: bool,
}

/// A single producer activation bound to one file and one stop channel.
pub struct Producer {
    id: ActivationId,
    path: PathBuf,
    file: File,
    stop_rx: mpsc::Receiver<()>,
    tick: Duration,
}

impl Producer {
    pub fn new(
        id: ActivationId,
        path: PathBuf,
        file: File,
        stop_rx: mpsc::Receiver<()>,
        tick: Duration,
    ) -> Self {
        Self {
            id,
            path,
            file,
            stop_rx,
            tick,
        }
    }

    /// Pump records until stopped, then truncate and close the file.
    ///
    /// The stop branch is polled first, so once a stop is visible no
    /// further write is attempted. A dropped sender counts as a stop.
    pub async fn run(self) -> ProducerSummary {
        let Producer {
            id,
            path,
            mut file,
            mut stop_rx,
            tick,
        } = self;

        crate::log_event!("producer", "pumping", "{id} -> {}", path.display());

        // First record lands one full interval after start.
        let mut ticker = interval_at(Instant::now() + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut summary = ProducerSummary::default();

        loop {
            tokio::select! {
                biased;

                _ = stop_rx.recv() => break,

                _ = ticker.tick() => {
                    match write_record(&mut file, id, &path).await {
                        Ok(()) => summary.records_written += 1,
                        Err(e) => {
                            summary.write_failures += 1;
                            tracing::warn!("[producer] {id}: {e}");
                        }
                    }
                }
            }
        }

        crate::log_event!("producer", "stopping", "{id} -> {}", path.display());

        match file.set_len(0).await {
            Ok(()) => summary.truncated = true,
            Err(source) => {
                let e = SwitchboardError::FileTruncate {
                    path: path.clone(),
                    source,
                };
                tracing::error!("[producer] {id}: {e}");
            }
        }

        // Waits for any in-flight operation before the descriptor is closed.
        drop(file.into_std().await);

        crate::debug_event!(
            "producer",
            "closed",
            "{id} wrote {} records ({} failed)",
            summary.records_written,
            summary.write_failures
        );

        summary
    }
}

/// Format one record line.
pub fn format_record(id: ActivationId, path: &Path) -> String {
    format!(
        "{id}, Logs for {} at {}\n",
        path.display(),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f %z")
    )
}

async fn write_record(
    file: &mut File,
    id: ActivationId,
    path: &Path,
) -> Result<(), SwitchboardError> {
    let record = format_record(id, path);
    let to_error = |source| SwitchboardError::FileWrite {
        path: path.to_path_buf(),
        source,
    };

    file.write_all(record.as_bytes()).await.map_err(to_error)?;
    file.flush().await.map_err(to_error)
}
