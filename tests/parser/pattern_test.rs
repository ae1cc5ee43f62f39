use tempfile::TempDir;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;
use vrclog::config::VrclogConfig;
use vrclog::parser::{ChainMode, PatternError, PatternParser, MAX_PATTERN_FILE_SIZE};
use vrclog::watcher::{ReplayMode, Watcher};
use vrclog::EventType;

use crate::watcher::next_event;

const PATTERNS: &str = r"
version: 1
patterns:
  - id: portal
    event_type: portal_spawn
    regex: '\[Portal\] Spawned by (?P<owner>\w+) to (?P<world>wrld_[0-9a-f-]+)'
";

#[tokio::test]
async fn test_pattern_file_through_watcher() {
    let dir = TempDir::new().unwrap();
    let patterns = dir.path().join("patterns.yaml");
    std::fs::write(&patterns, PATTERNS).unwrap();
    std::fs::write(
        dir.path().join("output_log_a.txt"),
        "2024.01.15 10:00:00 Log        -  [Behaviour] OnPlayerJoined Carol\n\
         2024.01.15 10:00:01 Log        -  [Portal] Spawned by Carol to wrld_0123-abcd\n",
    )
    .unwrap();

    let config = VrclogConfig {
        log_dir: Some(dir.path().to_path_buf()),
        poll_interval_ms: 50,
        patterns: vec![patterns],
        chain_mode: ChainMode::All,
        ..VrclogConfig::default()
    };
    let options = config
        .to_watch_options()
        .unwrap()
        .with_replay(ReplayMode::FromStart);
    let watcher = Watcher::new(options).unwrap();
    let (mut events, _errors) = watcher.watch(&CancellationToken::new()).unwrap();

    let join = next_event(&mut events).await;
    assert_eq!(join.event_type, EventType::PlayerJoin);

    let portal = next_event(&mut events).await;
    assert_eq!(portal.event_type, EventType::from("portal_spawn"));
    assert_eq!(portal.data["owner"], "Carol");
    assert_eq!(portal.data["world"], "wrld_0123-abcd");
    assert_eq!(portal.timestamp.format("%H:%M:%S").to_string(), "10:00:01");

    assert_ok!(watcher.close().await);
}

#[test]
fn test_pattern_file_must_be_regular_file() {
    let dir = TempDir::new().unwrap();
    let err = PatternParser::from_file(dir.path()).unwrap_err();
    assert!(matches!(err, PatternError::NotRegularFile(_)));
}

#[test]
fn test_pattern_file_size_limit() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("huge.yaml");
    let size = usize::try_from(MAX_PATTERN_FILE_SIZE).unwrap() + 1;
    std::fs::write(&path, "#".repeat(size)).unwrap();

    let err = PatternParser::from_file(&path).unwrap_err();
    assert!(matches!(err, PatternError::FileTooLarge { .. }));
}

#[test]
fn test_pattern_parsers_share_cache() {
    let file = vrclog::parser::PatternFile::from_yaml(PATTERNS).unwrap();
    let cache = vrclog::parser::RegexCache::new();
    let a = PatternParser::with_cache(file.clone(), &cache).unwrap();
    let b = PatternParser::with_cache(file, &cache).unwrap();
    assert_eq!(cache.len(), 1);
    assert_eq!(a.ids().collect::<Vec<_>>(), ["portal"]);
    assert_eq!(b.len(), 1);
}
