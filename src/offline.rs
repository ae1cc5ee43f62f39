//! Parsing existing log files without following them.

use std::path::Path;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::event::Event;
use crate::parser::{Parser, VrcParser};
use crate::watcher::{list_log_files, EventFilter, WatcherError};

/// Parses whole log files with the same parser and filters as a watcher.
pub struct OfflineParser {
    parser: Arc<dyn Parser>,
    filter: EventFilter,
    stop_on_error: bool,
}

impl std::fmt::Debug for OfflineParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineParser")
            .field("filter", &self.filter)
            .field("stop_on_error", &self.stop_on_error)
            .finish_non_exhaustive()
    }
}

impl Default for OfflineParser {
    fn default() -> Self {
        Self::new(Arc::new(VrcParser::new()))
    }
}

impl OfflineParser {
    #[must_use]
    pub fn new(parser: Arc<dyn Parser>) -> Self {
        Self {
            parser,
            filter: EventFilter::new(),
            stop_on_error: false,
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: EventFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Return the first parse error instead of skipping the line.
    #[must_use]
    pub fn with_stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = stop;
        self
    }

    /// Parse every line of `path`.
    ///
    /// Lines whose parser fails are skipped with a warning unless
    /// `stop_on_error` is set. Partial results of a failed line are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, or the first parse
    /// error when `stop_on_error` is set.
    pub async fn parse_file(
        &self,
        cancel: &CancellationToken,
        path: &Path,
    ) -> Result<Vec<Event>, WatcherError> {
        let file = File::open(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => WatcherError::FileDeleted(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => {
                WatcherError::PermissionDenied(path.to_path_buf())
            }
            _ => WatcherError::Io(e),
        })?;

        let mut lines = BufReader::new(file).lines();
        let mut events = Vec::new();
        let mut line_no = 0usize;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if cancel.is_cancelled() {
                break;
            }
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if line.is_empty() {
                continue;
            }

            let result = match self.parser.parse_line(cancel, line).await {
                Ok(result) => result,
                Err(mut e) => {
                    let partial = e.take_partial().unwrap_or_default();
                    events.extend(
                        partial
                            .events
                            .into_iter()
                            .filter_map(|ev| self.filter.apply(ev, line)),
                    );
                    if self.stop_on_error {
                        return Err(e.into());
                    }
                    tracing::warn!(
                        path = %path.display(),
                        line = line_no,
                        error = %e,
                        "Skipping line"
                    );
                    continue;
                }
            };
            events.extend(
                result
                    .events
                    .into_iter()
                    .filter_map(|ev| self.filter.apply(ev, line)),
            );
        }

        tracing::debug!(
            path = %path.display(),
            lines = line_no,
            events = events.len(),
            "Parsed log file"
        );
        Ok(events)
    }

    /// Parse every log file in `dir`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::LogDirNotFound`] if `dir` does not exist and
    /// any error from [`parse_file`](Self::parse_file).
    pub async fn parse_dir(
        &self,
        cancel: &CancellationToken,
        dir: &Path,
    ) -> Result<Vec<Event>, WatcherError> {
        let files = list_log_files(dir)?;
        let mut events = Vec::new();
        for file in files {
            if cancel.is_cancelled() {
                break;
            }
            events.extend(self.parse_file(cancel, &file).await?);
        }
        Ok(events)
    }
}
