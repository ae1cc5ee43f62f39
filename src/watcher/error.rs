//! Watcher error types.

use std::fmt;
use std::path::PathBuf;

use crate::parser::{ParseError, PatternError};

/// Stage of the watcher that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Finding the active log file.
    Resolve,
    /// Replaying historical lines.
    Replay,
    /// Following the active file.
    Tail,
    /// Checking for and switching to a newer file.
    Rotation,
    /// Running the parser on a line.
    Parse,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Resolve => "resolve",
            Self::Replay => "replay",
            Self::Tail => "tail",
            Self::Rotation => "rotation",
            Self::Parse => "parse",
        })
    }
}

/// Which replay budget was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayLimit {
    /// Total bytes read from the file.
    TotalBytes,
    /// Bytes of a single kept line.
    LineBytes,
}

impl fmt::Display for ReplayLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TotalBytes => "total bytes",
            Self::LineBytes => "line bytes",
        })
    }
}

/// Errors from the last-N replay scan.
#[derive(thiserror::Error, Debug)]
pub enum ReplayError {
    /// A replay budget would be exceeded.
    #[error("Replay limit exceeded: {kind} > {limit}")]
    LimitExceeded { kind: ReplayLimit, limit: u64 },

    /// I/O error reading the file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while configuring or running a watcher.
#[derive(thiserror::Error, Debug)]
pub enum WatcherError {
    /// Options failed validation.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// The log directory does not exist or is not a directory.
    #[error("Log directory not found: {0}")]
    LogDirNotFound(PathBuf),

    /// No log directory could be determined for this platform.
    #[error("Could not determine the log directory")]
    LogDirUnknown,

    /// The log directory holds no log files.
    #[error("No log files found in {0}")]
    NoLogFiles(PathBuf),

    /// `close` was already called.
    #[error("Watcher already closed")]
    AlreadyClosed,

    /// `watch` was already called.
    #[error("Watch already called")]
    AlreadyWatching,

    /// `watch` was called outside a tokio runtime.
    #[error("No tokio runtime available")]
    NoRuntime,

    /// The line source stopped unexpectedly.
    #[error("Line source closed: {0}")]
    LineSourceClosed(PathBuf),

    /// Watched file was deleted.
    #[error("Watched file deleted: {0}")]
    FileDeleted(PathBuf),

    /// Permission denied accessing file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Replay failed.
    #[error("Replay error: {0}")]
    Replay(#[from] ReplayError),

    /// A parser reported an error.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Loading a pattern file failed.
    #[error("Pattern error: {0}")]
    Pattern(#[from] PatternError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A background task panicked or was aborted.
    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Error annotated with the stage that produced it.
    #[error("{phase} failed: {source}")]
    Phase {
        phase: Phase,
        /// Whether the worker stopped after this error.
        fatal: bool,
        source: Box<WatcherError>,
    },
}

impl WatcherError {
    /// Wrap as a non-fatal error of `phase`.
    #[must_use]
    pub fn during(self, phase: Phase) -> Self {
        Self::Phase {
            phase,
            fatal: false,
            source: Box::new(self),
        }
    }

    /// Wrap as a fatal error of `phase`.
    #[must_use]
    pub fn fatal(self, phase: Phase) -> Self {
        Self::Phase {
            phase,
            fatal: true,
            source: Box::new(self),
        }
    }

    /// The underlying error with phase context removed.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Phase { source, .. } => source.root(),
            other => other,
        }
    }

    /// Stage that produced this error, if annotated.
    #[must_use]
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::Phase { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Whether the worker stopped after delivering this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Phase { fatal: true, .. })
    }

    /// Whether the root cause is an empty log directory.
    #[must_use]
    pub fn is_no_log_files(&self) -> bool {
        matches!(self.root(), Self::NoLogFiles(_))
    }
}
