//! Log watching: directory discovery, replay, tailing and rotation.

mod discovery;
mod error;
mod filter;
mod log_watcher;
mod options;
mod replay;
mod tailer;

pub use discovery::{
    default_candidates, is_log_file_name, list_log_files, LogPathResolver, PathResolver,
    LOG_DIR_ENV, LOG_FILE_EXTENSION, LOG_FILE_PREFIX,
};
pub use error::{Phase, ReplayError, ReplayLimit, WatcherError};
pub use filter::EventFilter;
pub use log_watcher::{WatchChannels, Watcher};
pub use options::{
    ReplayConfig, ReplayMode, WatchOptions, DEFAULT_ERROR_BUFFER, DEFAULT_EVENT_BUFFER,
    DEFAULT_MAX_REPLAY_BYTES, DEFAULT_MAX_REPLAY_LINES, DEFAULT_MAX_REPLAY_LINE_BYTES,
    DEFAULT_POLL_INTERVAL,
};
pub use replay::{read_last_lines, LastLines, ReplayLimits};
pub use tailer::{FileTailer, LineSource, TailConfig, TailStart, DEFAULT_TAIL_INTERVAL};
