//! Watcher configuration.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tracing::Dispatch;

use super::discovery::{LogPathResolver, PathResolver};
use super::error::WatcherError;
use crate::event::EventType;
use crate::parser::{Parser, VrcParser};

/// Default interval for rotation checks and tail polling.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Upper bound on `ReplayMode::LastN` unless configured otherwise.
pub const DEFAULT_MAX_REPLAY_LINES: usize = 10_000;

/// Default budget of bytes read during a last-N replay.
pub const DEFAULT_MAX_REPLAY_BYTES: u64 = 10 * 1024 * 1024;

/// Default budget for a single replayed line.
pub const DEFAULT_MAX_REPLAY_LINE_BYTES: usize = 512 * 1024;

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 16;

/// Default capacity of the error channel.
pub const DEFAULT_ERROR_BUFFER: usize = 16;

/// What to emit from content that existed before watching started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplayMode {
    /// Only lines written after attaching.
    #[default]
    None,
    /// The whole existing file.
    FromStart,
    /// The last `n` non-empty lines.
    LastN(usize),
    /// Lines whose events are at or after the given time.
    Since(DateTime<Local>),
}

/// Replay mode plus its budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayConfig {
    pub mode: ReplayMode,
    /// Largest `n` accepted for [`ReplayMode::LastN`].
    pub max_lines: usize,
    /// Bytes a last-N scan may read.
    pub max_total_bytes: u64,
    /// Bytes a single replayed line may hold.
    pub max_line_bytes: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            mode: ReplayMode::None,
            max_lines: DEFAULT_MAX_REPLAY_LINES,
            max_total_bytes: DEFAULT_MAX_REPLAY_BYTES,
            max_line_bytes: DEFAULT_MAX_REPLAY_LINE_BYTES,
        }
    }
}

impl ReplayConfig {
    /// Config with `mode` and default budgets.
    #[must_use]
    pub fn new(mode: ReplayMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}

/// Options for [`Watcher`](super::Watcher).
///
/// `WatchOptions::default()` is a valid configuration: auto-detected log
/// directory, built-in parser, no replay, no filters.
#[derive(Clone)]
pub struct WatchOptions {
    /// Log directory override. Auto-detected when `None`.
    pub log_dir: Option<PathBuf>,
    /// Interval for rotation checks, tail polling and waiting for logs.
    pub poll_interval: Duration,
    /// Attach the source line to every event.
    pub include_raw_line: bool,
    pub replay: ReplayConfig,
    /// Only emit these types. Empty means all.
    pub include_types: HashSet<EventType>,
    /// Never emit these types. Takes precedence over `include_types`.
    pub exclude_types: HashSet<EventType>,
    /// Parser for every line. [`VrcParser`] when `None`.
    pub parser: Option<Arc<dyn Parser>>,
    /// Keep polling when the directory has no log file yet.
    pub wait_for_logs: bool,
    pub event_buffer: usize,
    pub error_buffer: usize,
    /// Locates the log directory and its latest file.
    pub resolver: Option<Arc<dyn PathResolver>>,
    /// Subscriber for the worker's logs. `Dispatch::none()` silences them;
    /// `None` uses the ambient subscriber.
    pub dispatch: Option<Dispatch>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            log_dir: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            include_raw_line: false,
            replay: ReplayConfig::default(),
            include_types: HashSet::new(),
            exclude_types: HashSet::new(),
            parser: None,
            wait_for_logs: false,
            event_buffer: DEFAULT_EVENT_BUFFER,
            error_buffer: DEFAULT_ERROR_BUFFER,
            resolver: None,
            dispatch: None,
        }
    }
}

impl fmt::Debug for WatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchOptions")
            .field("log_dir", &self.log_dir)
            .field("poll_interval", &self.poll_interval)
            .field("include_raw_line", &self.include_raw_line)
            .field("replay", &self.replay)
            .field("include_types", &self.include_types)
            .field("exclude_types", &self.exclude_types)
            .field("custom_parser", &self.parser.is_some())
            .field("wait_for_logs", &self.wait_for_logs)
            .field("event_buffer", &self.event_buffer)
            .field("error_buffer", &self.error_buffer)
            .finish_non_exhaustive()
    }
}

impl WatchOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_raw_line(mut self, include: bool) -> Self {
        self.include_raw_line = include;
        self
    }

    #[must_use]
    pub fn with_replay(mut self, mode: ReplayMode) -> Self {
        self.replay.mode = mode;
        self
    }

    #[must_use]
    pub fn with_replay_config(mut self, replay: ReplayConfig) -> Self {
        self.replay = replay;
        self
    }

    #[must_use]
    pub fn with_include_types(mut self, types: impl IntoIterator<Item = EventType>) -> Self {
        self.include_types = types.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_exclude_types(mut self, types: impl IntoIterator<Item = EventType>) -> Self {
        self.exclude_types = types.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn Parser>) -> Self {
        self.parser = Some(parser);
        self
    }

    #[must_use]
    pub fn with_wait_for_logs(mut self, wait: bool) -> Self {
        self.wait_for_logs = wait;
        self
    }

    #[must_use]
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    #[must_use]
    pub fn with_error_buffer(mut self, capacity: usize) -> Self {
        self.error_buffer = capacity;
        self
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn PathResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    #[must_use]
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Check the options without touching the filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::InvalidOptions`] if a last-N replay exceeds
    /// `max_lines`, a replay budget is zero, or a duration or buffer is zero.
    pub fn validate(&self) -> Result<(), WatcherError> {
        if self.poll_interval.is_zero() {
            return Err(WatcherError::InvalidOptions(
                "poll interval must be positive".to_string(),
            ));
        }
        if self.event_buffer == 0 || self.error_buffer == 0 {
            return Err(WatcherError::InvalidOptions(
                "channel buffers must be positive".to_string(),
            ));
        }
        if let ReplayMode::LastN(n) = self.replay.mode {
            if n > self.replay.max_lines {
                return Err(WatcherError::InvalidOptions(format!(
                    "replay of {n} lines exceeds the maximum of {}",
                    self.replay.max_lines
                )));
            }
            if self.replay.max_total_bytes == 0 || self.replay.max_line_bytes == 0 {
                return Err(WatcherError::InvalidOptions(
                    "replay byte limits must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// The configured parser, or the built-in one.
    pub(crate) fn parser_or_default(&self) -> Arc<dyn Parser> {
        self.parser
            .clone()
            .unwrap_or_else(|| Arc::new(VrcParser::new()))
    }

    /// The configured resolver, or the default one.
    pub(crate) fn resolver_or_default(&self) -> Arc<dyn PathResolver> {
        self.resolver
            .clone()
            .unwrap_or_else(|| Arc::new(LogPathResolver::new()))
    }
}
