//! Run command: wire registry, synchronizer, reader and switchboard together.

use std::time::Duration;

use anyhow::Context;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::reader::Reader;
use crate::switchboard::Switchboard;
use crate::watcher::{InotifySource, Synchronizer, Units};

/// Run until Ctrl-C, then stop every producer and return.
pub async fn run_switchboard(settings: &Settings) -> anyhow::Result<()> {
    let base_dir = settings.resolved_base_dir();
    std::fs::create_dir_all(&base_dir)
        .with_context(|| format!("creating unit directory {}", base_dir.display()))?;

    let units = Units::new();
    let added = units.populate(settings.unit_count);
    crate::log_event!("registry", "populated", "{added} units");

    let (mut source, watch_handle) = InotifySource::new(settings.sync.event_capacity)?;
    let shutdown = CancellationToken::new();

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            crate::log_event!("switchboard", "interrupt received");
            signal_token.cancel();
        }
    });

    let synchronizer = Synchronizer::new(units.clone(), watch_handle, &base_dir);
    let sync_task = tokio::spawn(synchronizer.run(settings.sync.interval(), shutdown.clone()));

    // Give the first reconciliation a chance to create files and watches.
    tokio::select! {
        _ = shutdown.cancelled() => {}
        _ = sleep(Duration::from_millis(settings.startup_delay_ms)) => {}
    }

    let reader_task = settings.reader.enabled.then(|| {
        let reader = Reader::new(units.clone(), &base_dir, settings.reader.clone());
        tokio::spawn(reader.run(shutdown.clone()))
    });

    let mut board = Switchboard::new().with_tick(settings.producer.tick());
    board.run(&mut source, &shutdown).await;

    // The board only returns on shutdown; make sure the rest sees it too.
    shutdown.cancel();
    if let Some(task) = reader_task {
        task.await.context("reader task failed")?;
    }
    sync_task.await.context("synchronizer task failed")?;

    Ok(())
}
