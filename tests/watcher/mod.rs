//! Watcher module tests.

mod lifecycle_test;
mod replay_test;
mod rotation_test;

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use vrclog::watcher::WatchOptions;
use vrclog::Event;

pub const WAIT: Duration = Duration::from_secs(5);
pub const POLL: Duration = Duration::from_millis(50);

/// A log line as VRChat writes it.
pub fn log_line(time: &str, body: &str) -> String {
    format!("2024.01.15 {time} Log        -  {body}\n")
}

pub fn join(time: &str, name: &str) -> String {
    log_line(time, &format!("[Behaviour] OnPlayerJoined {name}"))
}

pub fn left(time: &str, name: &str) -> String {
    log_line(time, &format!("[Behaviour] OnPlayerLeft {name}"))
}

/// Create a log file with `content` and the given age.
pub fn write_log(dir: &Path, name: &str, content: &str, age: Duration) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(SystemTime::now() - age)
        .unwrap();
    path
}

pub fn append(path: &Path, content: &str) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
}

pub fn fast_options(dir: &Path) -> WatchOptions {
    WatchOptions::new().with_log_dir(dir).with_poll_interval(POLL)
}

/// Receive the next event, failing the test after [`WAIT`].
pub async fn next_event(events: &mut mpsc::Receiver<Event>) -> Event {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Give the worker time to attach before appending.
pub async fn settle() {
    tokio::time::sleep(POLL * 4).await;
}

#[test]
fn test_all_watcher_types_exported() {
    use vrclog::watcher::{
        read_last_lines, EventFilter, FileTailer, LastLines, LineSource, LogPathResolver, Phase,
        ReplayConfig, ReplayError, ReplayLimit, ReplayLimits, ReplayMode, TailConfig, TailStart,
        Watcher, WatcherError,
    };

    let _ = EventFilter::new();
    let _ = LogPathResolver::new();
    let _ = ReplayConfig::new(ReplayMode::LastN(5));
    let _ = TailConfig::new(TailStart::End);
    let _ = FileTailer::new(PathBuf::from("/tmp/output_log_x.txt"));
    let _: fn(&Path, usize, &ReplayLimits) -> Result<LastLines, ReplayError> = read_last_lines;
    let _ = Phase::Rotation;
    let _ = ReplayLimit::TotalBytes;
    let _: Option<&LineSource> = None;
    let _: Option<&Watcher> = None;
    let _: fn() -> WatcherError = || WatcherError::AlreadyClosed;
}
