//! End-to-end tests driving a real watcher against temporary directories.

use std::fs::{self, File};
use std::time::Duration;

use camino::Utf8PathBuf;
use pw_core::WatchConfig;
use pw_watcher::{FileEvent, LifecycleState, Op, WatchError, Watcher};
use tempfile::TempDir;
use tokio::sync::mpsc::Receiver;
use tokio::time::timeout;

const TICK: Duration = Duration::from_millis(20);
const LIMIT: Duration = Duration::from_secs(5);

fn utf8(dir: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("temp dir is UTF-8")
}

/// Waits for the next event on a file, skipping directory mtime updates.
async fn next_file_event(events: &mut Receiver<FileEvent>) -> FileEvent {
    loop {
        let event = timeout(LIMIT, events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event stream ended");
        if !event.is_dir_event() {
            return event;
        }
    }
}

async fn next_error(errors: &mut Receiver<WatchError>) -> WatchError {
    timeout(LIMIT, errors.recv())
        .await
        .expect("timed out waiting for an error")
        .expect("error stream ended")
}

#[tokio::test]
async fn create_rename_remove_recreate_move() {
    let d_dir = TempDir::new().unwrap();
    let e_dir = TempDir::new().unwrap();
    let (d, e) = (utf8(&d_dir), utf8(&e_dir));

    let watcher = Watcher::new();
    watcher.add(&d).unwrap();
    watcher.add(&e).unwrap();
    let mut events = watcher.take_events().unwrap();
    let mut errors = watcher.take_errors().unwrap();
    watcher.start(TICK).unwrap();

    File::create(d.join("a")).unwrap();
    let event = next_file_event(&mut events).await;
    assert_eq!(event.op, Op::CREATE);
    assert_eq!(event.path, d.join("a"));

    fs::rename(d.join("a"), d.join("b")).unwrap();
    let event = next_file_event(&mut events).await;
    assert!(event.has_ops(&[Op::RENAME]));
    assert!(!event.has_ops(&[Op::CREATE, Op::REMOVE, Op::MOVE]));
    assert_eq!(event.path, d.join("a"));
    assert_eq!(event.destination(), Some(d.join("b").as_path()));

    fs::remove_file(d.join("b")).unwrap();
    let event = next_file_event(&mut events).await;
    assert_eq!(event.op, Op::REMOVE);
    assert_eq!(event.path, d.join("b"));

    File::create(d.join("a")).unwrap();
    let event = next_file_event(&mut events).await;
    assert_eq!(event.op, Op::CREATE);
    assert_eq!(event.path, d.join("a"));

    fs::rename(d.join("a"), e.join("a")).unwrap();
    let event = next_file_event(&mut events).await;
    assert_eq!(event.op, Op::MOVE);
    assert_eq!(event.path, d.join("a"));
    assert_eq!(event.destination(), Some(e.join("a").as_path()));

    watcher.close().await;
    assert!(errors.recv().await.is_none());
}

#[tokio::test]
async fn deleted_target_is_reported_once_and_deregistered() {
    let dir = TempDir::new().unwrap();
    let target = utf8(&dir).join("target");
    fs::create_dir(&target).unwrap();
    File::create(target.join("inside")).unwrap();

    let watcher = Watcher::new();
    watcher.add(&target).unwrap();
    let mut errors = watcher.take_errors().unwrap();
    let _events = watcher.take_events().unwrap();
    watcher.start(TICK).unwrap();

    fs::remove_dir_all(&target).unwrap();
    let err = next_error(&mut errors).await;
    assert!(err.is_not_found());
    assert_eq!(err.path(), Some(target.as_path()));
    assert!(watcher.targets().is_empty());

    // Pruned targets are not retried.
    assert!(timeout(TICK * 10, errors.recv()).await.is_err());
    watcher.close().await;
}

#[tokio::test]
async fn removed_target_goes_quiet() {
    let dir = TempDir::new().unwrap();
    let root = utf8(&dir);

    let watcher = Watcher::new();
    watcher.add(&root).unwrap();
    let mut events = watcher.take_events().unwrap();
    watcher.start(TICK).unwrap();
    watcher.remove(&root).unwrap();

    File::create(root.join("ignored")).unwrap();
    assert!(timeout(TICK * 10, events.recv()).await.is_err());
    watcher.close().await;
}

#[cfg(unix)]
#[tokio::test]
async fn permission_change_reported_when_enabled() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let file = utf8(&dir).join("locked");
    File::create(&file).unwrap();
    fs::set_permissions(&file, fs::Permissions::from_mode(0o644)).unwrap();

    let config = WatchConfig {
        detect_chmod: true,
        ..WatchConfig::default()
    };
    let watcher = Watcher::with_config(&config);
    watcher.add(&file).unwrap();
    let mut events = watcher.take_events().unwrap();
    watcher.start(TICK).unwrap();

    fs::set_permissions(&file, fs::Permissions::from_mode(0o600)).unwrap();
    let event = next_file_event(&mut events).await;
    assert_eq!(event.op, Op::CHMOD);
    assert_eq!(event.path, file);
    assert_eq!(event.meta.map(|m| m.mode & 0o777), Some(0o600));

    watcher.close().await;
}

#[tokio::test]
async fn streams_end_after_close() {
    let dir = TempDir::new().unwrap();
    let root = utf8(&dir);

    let watcher = Watcher::new();
    watcher.add(&root).unwrap();
    let mut events = watcher.take_events().unwrap();
    let mut errors = watcher.take_errors().unwrap();
    watcher.start(TICK).unwrap();

    File::create(root.join("one")).unwrap();
    next_file_event(&mut events).await;

    watcher.close().await;
    assert_eq!(watcher.state(), LifecycleState::Closed);

    let drained = timeout(LIMIT, async {
        while events.recv().await.is_some() {}
        while errors.recv().await.is_some() {}
    })
    .await;
    assert!(drained.is_ok(), "draining after close must not hang");
}
