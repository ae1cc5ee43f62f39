use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;
use vrclog::watcher::{LogPathResolver, PathResolver, Phase, Watcher, WatcherError};

use super::{append, fast_options, join, next_event, settle, write_log, WAIT};

#[tokio::test]
async fn test_rotation_to_newer_file() {
    let dir = TempDir::new().unwrap();
    let old = write_log(
        dir.path(),
        "output_log_2024-01-15_09-00-00.txt",
        "",
        Duration::from_secs(3600),
    );

    let watcher = Watcher::new(fast_options(dir.path())).unwrap();
    let (mut events, mut errors) = watcher.watch(&CancellationToken::new()).unwrap();
    settle().await;

    append(&old, &join("10:00:00", "BeforeRotation"));
    assert_eq!(
        next_event(&mut events).await.player_name.as_deref(),
        Some("BeforeRotation")
    );

    // The new file is read from its start.
    write_log(
        dir.path(),
        "output_log_2024-01-15_10-00-00.txt",
        &join("10:00:01", "AfterRotation"),
        Duration::ZERO,
    );
    assert_eq!(
        next_event(&mut events).await.player_name.as_deref(),
        Some("AfterRotation")
    );

    assert_ok!(watcher.close().await);
    while let Some(err) = errors.recv().await {
        assert_ne!(err.phase(), Some(Phase::Rotation), "unexpected error: {err}");
    }
}

#[tokio::test]
async fn test_old_file_lines_precede_new_file() {
    let dir = TempDir::new().unwrap();
    let old = write_log(
        dir.path(),
        "output_log_a.txt",
        "",
        Duration::from_secs(3600),
    );

    let watcher = Watcher::new(
        fast_options(dir.path()).with_poll_interval(Duration::from_millis(300)),
    )
    .unwrap();
    let (mut events, _errors) = watcher.watch(&CancellationToken::new()).unwrap();
    settle().await;

    // Written back to back: the old file's tail must be drained first.
    append(&old, &join("10:00:00", "Last"));
    write_log(
        dir.path(),
        "output_log_b.txt",
        &join("10:00:01", "First"),
        Duration::ZERO,
    );

    assert_eq!(next_event(&mut events).await.player_name.as_deref(), Some("Last"));
    assert_eq!(next_event(&mut events).await.player_name.as_deref(), Some("First"));
    assert_ok!(watcher.close().await);
}

/// Points at a log file that does not exist once `switch` appears.
struct VanishingResolver {
    inner: LogPathResolver,
    switch: PathBuf,
}

impl PathResolver for VanishingResolver {
    fn resolve_directory(&self, explicit: Option<&Path>) -> Result<PathBuf, WatcherError> {
        self.inner.resolve_directory(explicit)
    }

    fn resolve_latest_file(&self, dir: &Path) -> Result<PathBuf, WatcherError> {
        if self.switch.exists() {
            return Ok(dir.join("output_log_missing.txt"));
        }
        self.inner.resolve_latest_file(dir)
    }
}

#[tokio::test]
async fn test_failed_rotation_keeps_current_file() {
    let dir = TempDir::new().unwrap();
    let current = write_log(dir.path(), "output_log_a.txt", "", Duration::ZERO);
    let switch = dir.path().join("rotate.flag");

    let resolver = VanishingResolver {
        inner: LogPathResolver::new(),
        switch: switch.clone(),
    };
    let watcher =
        Watcher::new(fast_options(dir.path()).with_resolver(Arc::new(resolver))).unwrap();
    let (mut events, mut errors) = watcher.watch(&CancellationToken::new()).unwrap();
    settle().await;

    std::fs::write(&switch, "").unwrap();
    let err = tokio::time::timeout(WAIT, errors.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(err.phase(), Some(Phase::Rotation));
    assert!(!err.is_fatal());
    assert!(matches!(err.root(), WatcherError::FileDeleted(_)));

    append(&current, &join("10:00:00", "Still"));
    assert_eq!(
        next_event(&mut events).await.player_name.as_deref(),
        Some("Still")
    );
    assert!(watcher.is_watching());
    assert_ok!(watcher.close().await);
}
