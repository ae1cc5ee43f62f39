use std::time::Duration;

use chrono::{Local, TimeZone};
use tempfile::TempDir;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;
use vrclog::watcher::{ReplayMode, Watcher};
use vrclog::EventType;

use super::{append, fast_options, join, left, log_line, next_event, settle, write_log};

#[tokio::test]
async fn test_from_start_join_then_leave() {
    let dir = TempDir::new().unwrap();
    let content = format!(
        "{}{}{}",
        join("10:00:00", "Alice"),
        log_line("10:00:01", "[Behaviour] OnPlayerLeftRoom"),
        left("10:00:02", "Alice"),
    );
    write_log(dir.path(), "output_log_a.txt", &content, Duration::ZERO);

    let watcher =
        Watcher::new(fast_options(dir.path()).with_replay(ReplayMode::FromStart)).unwrap();
    let (mut events, _errors) = watcher.watch(&CancellationToken::new()).unwrap();

    let first = next_event(&mut events).await;
    let second = next_event(&mut events).await;
    assert_eq!(first.event_type, EventType::PlayerJoin);
    assert_eq!(second.event_type, EventType::PlayerLeft);
    assert_eq!(first.player_name.as_deref(), Some("Alice"));
    assert!(first.timestamp < second.timestamp);
    assert_ok!(watcher.close().await);
}

#[tokio::test]
async fn test_last_n_then_live() {
    let dir = TempDir::new().unwrap();
    let content: String = (1..=5)
        .map(|i| join(&format!("10:00:0{i}"), &format!("P{i}")))
        .collect();
    let path = write_log(dir.path(), "output_log_a.txt", &content, Duration::ZERO);

    let watcher =
        Watcher::new(fast_options(dir.path()).with_replay(ReplayMode::LastN(2))).unwrap();
    let (mut events, _errors) = watcher.watch(&CancellationToken::new()).unwrap();

    assert_eq!(next_event(&mut events).await.player_name.as_deref(), Some("P4"));
    assert_eq!(next_event(&mut events).await.player_name.as_deref(), Some("P5"));

    append(&path, &join("10:00:06", "P6"));
    assert_eq!(next_event(&mut events).await.player_name.as_deref(), Some("P6"));
    assert_ok!(watcher.close().await);
}

#[tokio::test]
async fn test_last_n_leaves_unfinished_line_to_tail() {
    let dir = TempDir::new().unwrap();
    let unfinished = join("10:00:01", "Alice");
    let (head, rest) = unfinished.split_at(unfinished.len() - 4);
    let content = format!("{}{head}", join("10:00:00", "Bob"));
    let path = write_log(dir.path(), "output_log_a.txt", &content, Duration::ZERO);

    let watcher =
        Watcher::new(fast_options(dir.path()).with_replay(ReplayMode::LastN(5))).unwrap();
    let (mut events, _errors) = watcher.watch(&CancellationToken::new()).unwrap();

    assert_eq!(next_event(&mut events).await.player_name.as_deref(), Some("Bob"));
    settle().await;

    append(&path, rest);
    assert_eq!(next_event(&mut events).await.player_name.as_deref(), Some("Alice"));
    assert_ok!(watcher.close().await);
}

#[tokio::test]
async fn test_since_drops_older_lines() {
    let dir = TempDir::new().unwrap();
    let content = format!(
        "{}{}",
        join("10:00:00", "Early"),
        join("12:00:00", "OnTime")
    );
    write_log(dir.path(), "output_log_a.txt", &content, Duration::ZERO);

    let since = Local.with_ymd_and_hms(2024, 1, 15, 11, 0, 0).unwrap();
    let watcher =
        Watcher::new(fast_options(dir.path()).with_replay(ReplayMode::Since(since))).unwrap();
    let (mut events, _errors) = watcher.watch(&CancellationToken::new()).unwrap();

    let event = next_event(&mut events).await;
    assert_eq!(event.player_name.as_deref(), Some("OnTime"));
    assert_ok!(watcher.close().await);
}

#[tokio::test]
async fn test_type_filters_and_raw_line() {
    let dir = TempDir::new().unwrap();
    let path = write_log(dir.path(), "output_log_a.txt", "", Duration::ZERO);

    let options = fast_options(dir.path())
        .with_include_types([EventType::PlayerJoin, EventType::PlayerLeft])
        .with_exclude_types([EventType::PlayerJoin])
        .with_raw_line(true);
    let watcher = Watcher::new(options).unwrap();
    let (mut events, _errors) = watcher.watch(&CancellationToken::new()).unwrap();

    settle().await;
    let leave = left("10:00:02", "Bob");
    append(
        &path,
        &format!(
            "{}{}{}",
            join("10:00:00", "Bob"),
            log_line("10:00:01", "[Behaviour] Entering Room: Somewhere"),
            leave
        ),
    );

    let event = next_event(&mut events).await;
    assert_eq!(event.event_type, EventType::PlayerLeft);
    assert_eq!(event.raw_line.as_deref(), Some(leave.trim_end()));
    assert_ok!(watcher.close().await);
}

#[tokio::test]
async fn test_no_replay_skips_existing_content() {
    let dir = TempDir::new().unwrap();
    let path = write_log(
        dir.path(),
        "output_log_a.txt",
        &join("10:00:00", "Old"),
        Duration::ZERO,
    );

    let watcher = Watcher::new(fast_options(dir.path())).unwrap();
    let (mut events, _errors) = watcher.watch(&CancellationToken::new()).unwrap();

    settle().await;
    append(&path, &join("10:00:01", "New"));
    assert_eq!(next_event(&mut events).await.player_name.as_deref(), Some("New"));
    assert_ok!(watcher.close().await);
}
