use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;
use tracing::Dispatch;
use vrclog::parser::{ParseError, ParseResult, Parser};
use vrclog::watcher::{Phase, ReplayMode, Watcher, WatcherError};
use vrclog::EventType;

use super::{append, fast_options, join, next_event, settle, write_log, WAIT};

#[tokio::test]
async fn test_close_is_idempotent() {
    let dir = TempDir::new().unwrap();
    write_log(dir.path(), "output_log_a.txt", "", Duration::ZERO);

    let watcher = Watcher::new(fast_options(dir.path())).unwrap();
    let (mut events, mut errors) = watcher.watch(&CancellationToken::new()).unwrap();

    assert_ok!(watcher.close().await);
    assert_ok!(watcher.close().await);
    assert!(watcher.is_closed());

    // Both channels are closed once close returns.
    assert!(events.recv().await.is_none());
    assert!(errors.recv().await.is_none());
}

#[tokio::test]
async fn test_watch_twice_fails() {
    let dir = TempDir::new().unwrap();
    write_log(dir.path(), "output_log_a.txt", "", Duration::ZERO);

    let watcher = Watcher::new(fast_options(dir.path())).unwrap();
    let _channels = watcher.watch(&CancellationToken::new()).unwrap();

    let err = watcher.watch(&CancellationToken::new()).unwrap_err();
    assert!(matches!(err.root(), WatcherError::AlreadyWatching));
    assert_ok!(watcher.close().await);
}

#[tokio::test]
async fn test_watch_after_close_fails() {
    let dir = TempDir::new().unwrap();
    let watcher = Watcher::new(fast_options(dir.path())).unwrap();
    assert_ok!(watcher.close().await);

    let err = watcher.watch(&CancellationToken::new()).unwrap_err();
    assert!(matches!(err, WatcherError::AlreadyClosed));
}

/// Takes a fixed time per line and ignores cancellation.
struct SlowParser {
    delay: Duration,
}

#[async_trait]
impl Parser for SlowParser {
    async fn parse_line(
        &self,
        _cancel: &CancellationToken,
        _line: &str,
    ) -> Result<ParseResult, ParseError> {
        tokio::time::sleep(self.delay).await;
        Ok(ParseResult::no_match())
    }
}

#[tokio::test]
async fn test_concurrent_close() {
    let dir = TempDir::new().unwrap();
    write_log(dir.path(), "output_log_a.txt", "", Duration::ZERO);

    let watcher = Arc::new(Watcher::new(fast_options(dir.path())).unwrap());
    let _channels = watcher.watch(&CancellationToken::new()).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let watcher = Arc::clone(&watcher);
            tokio::spawn(async move { watcher.close().await })
        })
        .collect();
    for handle in handles {
        assert_ok!(tokio::time::timeout(WAIT, handle).await.unwrap().unwrap());
    }
}

#[tokio::test]
async fn test_every_close_waits_for_worker() {
    let dir = TempDir::new().unwrap();
    write_log(dir.path(), "output_log_a.txt", &join("10:00:00", "Slow"), Duration::ZERO);

    let options = fast_options(dir.path())
        .with_replay(ReplayMode::FromStart)
        .with_parser(Arc::new(SlowParser {
            delay: Duration::from_millis(800),
        }));
    let watcher = Arc::new(Watcher::new(options).unwrap());
    let (mut events, mut errors) = watcher.watch(&CancellationToken::new()).unwrap();
    settle().await;

    let first = {
        let watcher = Arc::clone(&watcher);
        tokio::spawn(async move { watcher.close().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // The worker is still inside the parser; the second caller must wait too.
    assert_ok!(tokio::time::timeout(WAIT, watcher.close()).await.unwrap());
    assert!(matches!(events.try_recv(), Err(TryRecvError::Disconnected)));
    assert!(matches!(errors.try_recv(), Err(TryRecvError::Disconnected)));

    assert_ok!(tokio::time::timeout(WAIT, first).await.unwrap().unwrap());
}

/// Fails every line and counts calls.
struct FailingParser {
    calls: AtomicUsize,
}

#[async_trait]
impl Parser for FailingParser {
    async fn parse_line(
        &self,
        _cancel: &CancellationToken,
        _line: &str,
    ) -> Result<ParseResult, ParseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ParseError::custom("boom"))
    }
}

#[tokio::test]
async fn test_full_error_channel_does_not_block() {
    let dir = TempDir::new().unwrap();
    let content: String = (0..20).map(|i| join("10:00:00", &format!("P{i}"))).collect();
    write_log(dir.path(), "output_log_a.txt", &content, Duration::ZERO);

    let parser = Arc::new(FailingParser {
        calls: AtomicUsize::new(0),
    });
    let options = fast_options(dir.path())
        .with_replay(ReplayMode::FromStart)
        .with_parser(parser.clone())
        .with_error_buffer(1);
    let watcher = Watcher::new(options).unwrap();
    let (_events, mut errors) = watcher.watch(&CancellationToken::new()).unwrap();

    // Nobody reads errors; the worker must still get through every line.
    tokio::time::timeout(WAIT, async {
        while parser.calls.load(Ordering::SeqCst) < 20 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    tokio::time::timeout(WAIT, watcher.close()).await.unwrap().unwrap();

    let err = errors.recv().await.unwrap();
    assert_eq!(err.phase(), Some(Phase::Parse));
    assert!(!err.is_fatal());
    assert!(errors.recv().await.is_none());
}

#[tokio::test]
async fn test_wait_for_logs() {
    let dir = TempDir::new().unwrap();
    let options = fast_options(dir.path())
        .with_wait_for_logs(true)
        .with_replay(ReplayMode::FromStart);
    let watcher = Watcher::new(options).unwrap();
    let (mut events, _errors) = watcher.watch(&CancellationToken::new()).unwrap();

    settle().await;
    write_log(
        dir.path(),
        "output_log_a.txt",
        &join("10:00:00", "Late"),
        Duration::ZERO,
    );

    let event = next_event(&mut events).await;
    assert_eq!(event.player_name.as_deref(), Some("Late"));
    assert_ok!(watcher.close().await);
}

#[tokio::test]
async fn test_silent_dispatch_still_delivers() {
    let dir = TempDir::new().unwrap();
    let path = write_log(dir.path(), "output_log_a.txt", "", Duration::ZERO);

    let options = fast_options(dir.path()).with_dispatch(Dispatch::none());
    let watcher = Watcher::new(options).unwrap();
    let (mut events, _errors) = watcher.watch(&CancellationToken::new()).unwrap();

    settle().await;
    append(&path, &join("10:00:00", "Quiet"));

    let event = next_event(&mut events).await;
    assert_eq!(event.event_type, EventType::PlayerJoin);
    assert_ok!(watcher.close().await);
}

#[tokio::test]
async fn test_slow_consumer_backpressure_keeps_order() {
    let dir = TempDir::new().unwrap();
    let content: String = (0..50).map(|i| join("10:00:00", &format!("P{i}"))).collect();
    write_log(dir.path(), "output_log_a.txt", &content, Duration::ZERO);

    let options = fast_options(dir.path())
        .with_replay(ReplayMode::FromStart)
        .with_event_buffer(1);
    let watcher = Watcher::new(options).unwrap();
    let (mut events, _errors) = watcher.watch(&CancellationToken::new()).unwrap();

    for i in 0..50 {
        if i % 10 == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let event = next_event(&mut events).await;
        assert_eq!(event.player_name, Some(format!("P{i}")));
    }
    assert_ok!(watcher.close().await);
}
