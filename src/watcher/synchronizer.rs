//! Reconciles the unit registry against files and watches on disk.
//!
//! After a clean cycle every registered unit has exactly one file under the
//! base directory and one active watch, and no unregistered unit has either.
//! Failures are collected into the cycle's report and the affected unit is
//! retried on the next cycle.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use super::{UnitRegistry, WatchError, WatchRegistrar};

/// Default interval between reconciliation cycles.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Result of one reconciliation cycle.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Units that now have a file and a watch.
    pub added: Vec<String>,
    /// Units whose file and watch were removed.
    pub removed: Vec<String>,
    /// Failures; the affected units are retried next cycle.
    pub errors: Vec<WatchError>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

/// Mirrors a [`UnitRegistry`] onto files and watches.
pub struct Synchronizer<R, W> {
    registry: R,
    registrar: W,
    base_dir: PathBuf,
    /// Units that currently have both a file and a watch.
    known: BTreeSet<String>,
}

impl<R, W> Synchronizer<R, W>
where
    R: UnitRegistry,
    W: WatchRegistrar,
{
    pub fn new(registry: R, registrar: W, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            registrar,
            base_dir: base_dir.into(),
            known: BTreeSet::new(),
        }
    }

    /// File backing a unit.
    pub fn unit_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    /// Names of units that currently have a file and a watch.
    pub fn known_units(&self) -> &BTreeSet<String> {
        &self.known
    }

    /// Run one reconciliation cycle.
    pub async fn reconcile(&mut self) -> ReconcileReport {
        let wanted = self.registry.unit_names();
        let add: Vec<String> = wanted.difference(&self.known).cloned().collect();
        let del: Vec<String> = self.known.difference(&wanted).cloned().collect();

        let mut report = ReconcileReport::default();

        for name in add {
            match self.add_unit(&name).await {
                Ok(()) => {
                    self.known.insert(name.clone());
                    report.added.push(name);
                }
                Err(e) => report.errors.push(e),
            }
        }

        for name in del {
            match self.remove_unit(&name, &mut report.errors).await {
                Ok(()) => {
                    self.known.remove(&name);
                    report.removed.push(name);
                }
                Err(e) => report.errors.push(e),
            }
        }

        report
    }

    async fn add_unit(&mut self, name: &str) -> Result<(), WatchError> {
        let path = self.unit_path(name);

        // The creating handle is closed before the watch exists, so it never
        // shows up as an open.
        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|source| WatchError::FileCreate {
                path: path.clone(),
                source,
            })?;
        drop(file.into_std().await);

        self.registrar.watch(&path)?;
        crate::log_event!("sync", "watching", "{}", path.display());
        Ok(())
    }

    async fn remove_unit(
        &mut self,
        name: &str,
        errors: &mut Vec<WatchError>,
    ) -> Result<(), WatchError> {
        let path = self.unit_path(name);

        // A watch can already be gone if the file was deleted underneath us.
        // Reported with the rest of the cycle's errors.
        if let Err(e) = self.registrar.unwatch(&path) {
            errors.push(e);
        }

        remove_file(&path).await?;
        crate::log_event!("sync", "removed", "{}", path.display());
        Ok(())
    }

    /// Reconcile on a fixed interval until `shutdown` fires.
    ///
    /// The first cycle runs one interval after start.
    pub async fn run(mut self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        crate::log_event!("sync", "started", "{}", self.base_dir.display());

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.reconcile().await;
                    if report.has_changes() {
                        crate::log_event!(
                            "sync",
                            "reconciled",
                            "+{} -{} ({} watched)",
                            report.added.len(),
                            report.removed.len(),
                            self.known.len()
                        );
                    }
                    for e in &report.errors {
                        tracing::error!("[sync] {e}");
                    }
                }
            }
        }

        crate::log_event!("sync", "stopped");
    }
}

async fn remove_file(path: &Path) -> Result<(), WatchError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(WatchError::FileRemove {
            path: path.to_path_buf(),
            source,
        }),
    }
}
