//! Real inotify notifications driving the switchboard end to end.

use std::path::{Path, PathBuf};
use std::time::Duration;

use switchboard::reader::tail_for;
use switchboard::switchboard::Switchboard;
use switchboard::watcher::{DEFAULT_EVENT_CAPACITY, InotifySource, Synchronizer, Units};
use switchboard::{NotificationSource, Transition, WatchRegistrar};
use tempfile::TempDir;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const TICK: Duration = Duration::from_millis(20);
const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

fn unit_file(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, "").unwrap();
    path
}

fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).unwrap().len()
}

/// Feed the next notification from the source into the board.
async fn pump(source: &mut InotifySource, board: &mut Switchboard) -> Transition {
    let notification = timeout(EVENT_TIMEOUT, source.next())
        .await
        .expect("no notification in time")
        .expect("source ended");
    board.handle(notification).await
}

#[tokio::test]
async fn test_read_only_close_stops_producer() {
    let temp_dir = TempDir::new().unwrap();
    let path = unit_file(&temp_dir, "0");
    let (mut source, mut handle) = InotifySource::new(DEFAULT_EVENT_CAPACITY).unwrap();
    handle.watch(&path).unwrap();
    let mut board = Switchboard::new().with_tick(TICK);

    let reader = std::fs::File::open(&path).unwrap();

    let t = pump(&mut source, &mut board).await;
    assert!(matches!(t, Transition::Started { count: 1, .. }), "{t:?}");

    // The producer's own append handle shows up as the second open
    let t = pump(&mut source, &mut board).await;
    assert_eq!(t, Transition::Counted { count: 2 });

    drop(reader);
    let t = pump(&mut source, &mut board).await;
    assert!(matches!(t, Transition::Stopping { remaining: 1, .. }), "{t:?}");

    let summary = board.join_retired(&path).await.unwrap();
    assert!(summary.truncated);
    assert!(!board.is_producing(&path));
    assert_eq!(file_len(&path), 0);

    // Then the producer's own close, which changes nothing
    let t = pump(&mut source, &mut board).await;
    assert_eq!(t, Transition::Ignored { stale_count: None });
    assert_eq!(board.active_producers(), 0);
}

#[tokio::test]
async fn test_unit_creation_is_not_an_open() {
    let temp_dir = TempDir::new().unwrap();
    let units = Units::new();
    units.populate(1);
    let (mut source, handle) = InotifySource::new(DEFAULT_EVENT_CAPACITY).unwrap();

    let mut sync = Synchronizer::new(units, handle.clone(), temp_dir.path());
    let report = sync.reconcile().await;
    assert!(report.is_clean());

    let path = temp_dir.path().join("0");
    assert!(handle.is_watching(&path));

    // The first event seen is the reader's, not the synchronizer's create
    let reader = std::fs::File::open(&path).unwrap();
    let mut board = Switchboard::new().with_tick(TICK);
    let t = pump(&mut source, &mut board).await;
    assert!(matches!(t, Transition::Started { count: 1, .. }), "{t:?}");

    drop(reader);
    board.drain().await;
}

#[tokio::test]
async fn test_tailing_session_produces_then_truncates() {
    let temp_dir = TempDir::new().unwrap();
    let path = unit_file(&temp_dir, "0");
    let (mut source, mut handle) = InotifySource::new(DEFAULT_EVENT_CAPACITY).unwrap();
    handle.watch(&path).unwrap();

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let board_task = tokio::spawn(async move {
        let mut board = Switchboard::new().with_tick(TICK);
        board.run(&mut source, &token).await;
        board
    });

    let lines = tail_for(&path, Duration::from_millis(300), &CancellationToken::new())
        .await
        .unwrap();
    assert!(!lines.is_empty());
    assert!(lines[0].contains("Logs for"));

    // Output only shrinks once the reader's close has stopped the producer
    let mut truncated = false;
    for _ in 0..200 {
        if file_len(&path) == 0 {
            truncated = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(truncated, "producer kept running after the reader left");

    shutdown.cancel();
    let board = board_task.await.unwrap();
    assert_eq!(board.active_producers(), 0);
}
