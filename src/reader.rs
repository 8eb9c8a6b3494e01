//! Simulated reader: tails unit files the way a user asking for logs would.
//!
//! Each session opens one unit's file read-only, follows it for a bounded
//! time and closes it again. Those opens and closes are what the
//! switchboard counts, so running the reader exercises the whole pipeline.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::config::ReaderConfig;
use crate::watcher::UnitRegistry;

/// Granularity of session lengths.
pub const READ_STEP: Duration = Duration::from_secs(1);

/// How long to wait at end of file before checking for new output.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct Reader<R> {
    registry: R,
    base_dir: PathBuf,
    config: ReaderConfig,
    session: u64,
}

impl<R: UnitRegistry> Reader<R> {
    pub fn new(registry: R, base_dir: impl Into<PathBuf>, config: ReaderConfig) -> Self {
        Self {
            registry,
            base_dir: base_dir.into(),
            config,
            session: 0,
        }
    }

    /// Unit to read next: the configured one, or round-robin by name.
    pub fn next_unit(&self) -> Option<String> {
        let names = self.registry.unit_names();

        if let Some(unit) = &self.config.unit {
            return names.contains(unit).then(|| unit.clone());
        }

        if names.is_empty() {
            return None;
        }
        let index = (self.session % names.len() as u64) as usize;
        names.into_iter().nth(index)
    }

    /// Length of the current session: whole steps cycling from one step up
    /// to `max_read_ms`.
    ///
    /// Never shorter than one step: the file must still be held when the
    /// producer's own open is observed.
    pub fn read_time(&self) -> Duration {
        let step = READ_STEP.as_millis() as u64;
        let steps = (self.config.max_read_ms / step).max(1);
        Duration::from_millis((1 + self.session % steps) * step)
    }

    /// Run sessions until `shutdown` fires.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let idle = Duration::from_millis(self.config.idle_ms);

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = sleep(Duration::from_millis(self.config.start_delay_ms)) => {}
        }
        crate::log_event!("reader", "started");

        while !shutdown.is_cancelled() {
            let Some(unit) = self.next_unit() else {
                crate::log_event!("reader", "no units yet");
                pause(idle, &shutdown).await;
                continue;
            };

            let read_time = self.read_time();
            self.session += 1;
            let path = self.base_dir.join(&unit);

            crate::log_event!(
                "reader",
                "tailing",
                "{unit} for {:.0}s",
                read_time.as_secs_f64()
            );

            match tail_for(&path, read_time, &shutdown).await {
                Ok(lines) => {
                    for line in &lines {
                        tracing::info!("{unit} --- {line}");
                    }
                }
                Err(e) => {
                    tracing::warn!("[reader] error following {}: {e}", path.display());
                    pause(idle, &shutdown).await;
                }
            }
        }

        crate::log_event!("reader", "stopped");
    }
}

async fn pause(duration: Duration, shutdown: &CancellationToken) {
    tokio::select! {
        _ = shutdown.cancelled() => {}
        _ = sleep(duration) => {}
    }
}

/// Follow a file for `duration`, returning the lines read.
///
/// The file is held open for the whole session and closed on return. If the
/// file shrinks (a producer truncated it), reading restarts from the top.
pub async fn tail_for(
    path: &Path,
    duration: Duration,
    shutdown: &CancellationToken,
) -> std::io::Result<Vec<String>> {
    let deadline = Instant::now() + duration;
    let mut reader = BufReader::new(File::open(path).await?);
    let mut offset: u64 = 0;
    let mut lines = Vec::new();
    let mut buf = String::new();

    loop {
        buf.clear();
        let read = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = sleep_until(deadline) => break,
            read = reader.read_line(&mut buf) => read?,
        };

        if read == 0 {
            if tokio::fs::metadata(path).await?.len() < offset {
                reader.seek(SeekFrom::Start(0)).await?;
                offset = 0;
                continue;
            }
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = sleep_until(deadline) => break,
                _ = sleep(POLL_INTERVAL) => continue,
            }
        }

        offset += read as u64;
        lines.push(buf.trim_end_matches('\n').to_string());
    }

    Ok(lines)
}
