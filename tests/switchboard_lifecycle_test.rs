//! Producer lifecycle scenarios driven through the public switchboard API.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use switchboard::switchboard::ActivationId;
use switchboard::{ChannelSource, Notification, Switchboard, Transition};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const TICK: Duration = Duration::from_millis(20);

fn unit_file(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, "").unwrap();
    path
}

fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).unwrap().len()
}

async fn wait_for_output(path: &Path) {
    for _ in 0..200 {
        if file_len(path) > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no output in {}", path.display());
}

#[tokio::test]
async fn test_open_open_close_close_starts_producer_once() {
    let temp_dir = TempDir::new().unwrap();
    let path = unit_file(&temp_dir, "A");
    let mut board = Switchboard::new().with_tick(TICK);

    let started = board.handle(Notification::open(&path)).await;
    let Transition::Started { id, count: 1, .. } = started else {
        panic!("unexpected first transition: {started:?}");
    };

    assert_eq!(
        board.handle(Notification::open(&path)).await,
        Transition::Counted { count: 2 }
    );

    // Only the producer's own open remains: stop
    assert_eq!(
        board.handle(Notification::close(&path)).await,
        Transition::Stopping { id, remaining: 1 }
    );
    assert!(!board.is_producing(&path));
    assert_eq!(board.open_count(&path), None);

    // Trailing close is a stray and changes nothing
    assert_eq!(
        board.handle(Notification::close(&path)).await,
        Transition::Ignored { stale_count: None }
    );
    assert_eq!(board.active_producers(), 0);

    let summary = board.join_retired(&path).await.unwrap();
    assert!(summary.truncated);
}

#[tokio::test]
async fn test_immediate_close_still_starts_then_stops() {
    let temp_dir = TempDir::new().unwrap();
    let path = unit_file(&temp_dir, "A");
    let mut board = Switchboard::new().with_tick(TICK);

    let started = board.handle(Notification::open(&path)).await;
    let Transition::Started { id, .. } = started else {
        panic!("unexpected transition: {started:?}");
    };

    assert_eq!(
        board.handle(Notification::close(&path)).await,
        Transition::Stopping { id, remaining: 0 }
    );

    let summary = board.join_retired(&path).await.unwrap();
    assert!(summary.truncated);
    assert_eq!(file_len(&path), 0);
}

#[tokio::test]
async fn test_rapid_open_close_pairs_always_truncate() {
    let temp_dir = TempDir::new().unwrap();
    let path = unit_file(&temp_dir, "A");
    let mut board = Switchboard::new().with_tick(TICK);
    let mut activations: HashSet<ActivationId> = HashSet::new();

    for _ in 0..5 {
        match board.handle(Notification::open(&path)).await {
            Transition::Started { id, .. } => assert!(activations.insert(id)),
            other => panic!("unexpected transition: {other:?}"),
        }
        assert_eq!(board.active_producers(), 1);

        let stop = board.handle(Notification::close(&path)).await;
        assert!(matches!(stop, Transition::Stopping { .. }));

        let summary = board.join_retired(&path).await.unwrap();
        assert!(summary.truncated);
        assert_eq!(file_len(&path), 0);
    }

    assert_eq!(activations.len(), 5);
}

#[tokio::test]
async fn test_close_after_stop_is_noop() {
    let temp_dir = TempDir::new().unwrap();
    let path = unit_file(&temp_dir, "A");
    let mut board = Switchboard::new().with_tick(TICK);

    board.handle(Notification::open(&path)).await;
    board.handle(Notification::close(&path)).await;

    for _ in 0..3 {
        assert_eq!(
            board.handle(Notification::close(&path)).await,
            Transition::Ignored { stale_count: None }
        );
    }
    assert_eq!(board.open_count(&path), None);
    assert!(!board.is_producing(&path));
}

#[tokio::test]
async fn test_stray_close_never_touches_other_paths() {
    let temp_dir = TempDir::new().unwrap();
    let a = unit_file(&temp_dir, "A");
    let b = unit_file(&temp_dir, "B");
    let mut board = Switchboard::new().with_tick(TICK);

    board.handle(Notification::open(&a)).await;
    board.handle(Notification::open(&a)).await;

    assert_eq!(
        board.handle(Notification::close(&b)).await,
        Transition::Ignored { stale_count: None }
    );
    assert!(board.is_producing(&a));
    assert_eq!(board.open_count(&a), Some(2));
    assert!(!board.is_producing(&b));

    board.drain().await;
}

#[tokio::test]
async fn test_producer_output_is_truncated_on_last_close() {
    let temp_dir = TempDir::new().unwrap();
    let path = unit_file(&temp_dir, "A");
    let mut board = Switchboard::new().with_tick(TICK);

    // External reader, then the producer's own handle
    board.handle(Notification::open(&path)).await;
    board.handle(Notification::open(&path)).await;

    wait_for_output(&path).await;
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains(&format!("Logs for {}", path.display())));

    board.handle(Notification::close(&path)).await;
    let summary = board.join_retired(&path).await.unwrap();

    assert!(summary.records_written >= 1);
    assert_eq!(file_len(&path), 0);
}

#[tokio::test]
async fn test_run_drains_producers_when_stream_ends() {
    let temp_dir = TempDir::new().unwrap();
    let a = unit_file(&temp_dir, "A");
    let b = unit_file(&temp_dir, "B");
    let (tx, mut source) = ChannelSource::new(16);

    tx.send(Notification::open(&a)).await.unwrap();
    tx.send(Notification::open(&a)).await.unwrap();
    tx.send(Notification::open(&b)).await.unwrap();
    tx.send(Notification::open(&b)).await.unwrap();

    let writer = tokio::spawn(async move {
        wait_for_output(&a).await;
        wait_for_output(&b).await;
        drop(tx);
        (a, b)
    });

    let mut board = Switchboard::new().with_tick(TICK);
    board
        .run(&mut source, &CancellationToken::new())
        .await;
    let (a, b) = writer.await.unwrap();

    assert_eq!(board.active_producers(), 0);
    assert_eq!(board.open_count(&a), None);
    assert_eq!(file_len(&a), 0);
    assert_eq!(file_len(&b), 0);
}

#[tokio::test]
async fn test_run_stops_on_shutdown_with_live_stream() {
    let temp_dir = TempDir::new().unwrap();
    let path = unit_file(&temp_dir, "A");
    let (tx, mut source) = ChannelSource::new(16);
    tx.send(Notification::open(&path)).await.unwrap();

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    let watched = path.clone();
    tokio::spawn(async move {
        wait_for_output(&watched).await;
        trigger.cancel();
    });

    let mut board = Switchboard::new().with_tick(TICK);
    board.run(&mut source, &shutdown).await;

    assert_eq!(board.active_producers(), 0);
    assert_eq!(file_len(&path), 0);
    // Sender still alive: only the token ended the loop
    drop(tx);
}

#[tokio::test]
async fn test_open_on_missing_file_is_skipped_in_run() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("missing");
    let present = unit_file(&temp_dir, "present");
    let (tx, mut source) = ChannelSource::new(16);

    tx.send(Notification::open(&missing)).await.unwrap();
    tx.send(Notification::close(&missing)).await.unwrap();
    tx.send(Notification::open(&present)).await.unwrap();
    drop(tx);

    let mut board = Switchboard::new().with_tick(TICK);
    board.run(&mut source, &CancellationToken::new()).await;

    assert!(!missing.exists());
    assert_eq!(board.active_producers(), 0);
    assert_eq!(file_len(&present), 0);
}
