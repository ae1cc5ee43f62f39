//! Incremental log file tailer.
//!
//! [`FileTailer`] reads lines appended since its last read. [`LineSource`]
//! runs a `FileTailer` on a background task and delivers lines and errors
//! over two channels.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::error::WatcherError;

/// Most bytes consumed from the file in one read.
const MAX_READ_BYTES: u64 = 8 * 1024 * 1024;

/// Longest incomplete line kept between reads before it is discarded.
const MAX_PARTIAL_LINE: usize = 4 * 1024 * 1024;

/// Default interval between reads of the tailed file.
pub const DEFAULT_TAIL_INTERVAL: Duration = Duration::from_millis(200);

const LINE_BUFFER: usize = 256;
const ERROR_BUFFER: usize = 8;

/// Where a tail starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailStart {
    /// From the first byte.
    Beginning,
    /// From the size of the file when the tail is opened.
    End,
    /// From a byte offset.
    Offset(u64),
}

/// Incremental line reader that tracks its read position.
///
/// Reads only bytes appended since the last read. An incomplete last line is
/// held back until its newline arrives.
#[derive(Debug)]
pub struct FileTailer {
    /// Path to the log file.
    path: PathBuf,
    /// Current byte offset in the file.
    offset: u64,
    /// Bytes after the last newline seen.
    partial: Vec<u8>,
}

impl FileTailer {
    /// Create a new tailer starting at the beginning of the file.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self::with_offset(path, 0)
    }

    /// Create a new tailer starting at a specific offset.
    #[must_use]
    pub fn with_offset(path: PathBuf, offset: u64) -> Self {
        Self {
            path,
            offset,
            partial: Vec::new(),
        }
    }

    /// Get the current byte offset.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Get the path being tailed.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read complete lines appended since the last read.
    ///
    /// Line endings are stripped and empty lines skipped. If the file shrank
    /// below the current offset it was truncated or replaced, and reading
    /// restarts from the beginning.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be opened (file deleted, permission denied)
    /// - I/O errors occur during reading
    pub async fn read_new_lines(&mut self) -> Result<Vec<String>, WatcherError> {
        let mut file = open(&self.path).await?;
        let file_len = file.metadata().await?.len();

        if file_len < self.offset {
            tracing::warn!(
                path = %self.path.display(),
                old_offset = self.offset,
                new_len = file_len,
                "File truncated, resetting offset to 0"
            );
            self.reset();
        }

        if file_len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(std::io::SeekFrom::Start(self.offset)).await?;
        let mut chunk = Vec::new();
        let read = file
            .take((file_len - self.offset).min(MAX_READ_BYTES))
            .read_to_end(&mut chunk)
            .await?;
        self.offset += read as u64;

        Ok(self.split_lines(&chunk))
    }

    fn split_lines(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;
        while let Some(nl) = rest.iter().position(|&b| b == b'\n') {
            self.partial.extend_from_slice(&rest[..nl]);
            rest = &rest[nl + 1..];

            let raw = std::mem::take(&mut self.partial);
            let line = raw.strip_suffix(b"\r").unwrap_or(&raw);
            if !line.is_empty() {
                lines.push(String::from_utf8_lossy(line).into_owned());
            }
        }

        self.partial.extend_from_slice(rest);
        if self.partial.len() > MAX_PARTIAL_LINE {
            tracing::warn!(
                path = %self.path.display(),
                bytes = self.partial.len(),
                "Discarding oversized incomplete line"
            );
            self.partial.clear();
        }
        lines
    }

    /// Reset the offset to the beginning of the file.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.partial.clear();
    }
}

async fn open(path: &Path) -> Result<File, WatcherError> {
    match File::open(path).await {
        Ok(f) => Ok(f),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(WatcherError::FileDeleted(path.to_path_buf()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(WatcherError::PermissionDenied(path.to_path_buf()))
        }
        Err(e) => Err(WatcherError::Io(e)),
    }
}

/// Settings for [`LineSource::open`].
#[derive(Debug, Clone, Copy)]
pub struct TailConfig {
    pub start: TailStart,
    /// Interval between reads.
    pub interval: Duration,
    /// Fail to open if the file does not exist yet.
    pub must_exist: bool,
}

impl TailConfig {
    #[must_use]
    pub fn new(start: TailStart) -> Self {
        Self {
            start,
            interval: DEFAULT_TAIL_INTERVAL,
            must_exist: true,
        }
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn with_must_exist(mut self, must_exist: bool) -> Self {
        self.must_exist = must_exist;
        self
    }
}

/// Background tail of one file.
///
/// Lines and errors arrive on two channels that close together when the
/// task stops. Lines are sent with backpressure; errors are dropped when
/// their buffer is full. Dropping the source stops the task.
#[derive(Debug)]
pub struct LineSource {
    path: PathBuf,
    lines: mpsc::Receiver<String>,
    errors: mpsc::Receiver<WatcherError>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl LineSource {
    /// Start tailing `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if `must_exist` is set and the file cannot be
    /// opened, or if its size cannot be read for [`TailStart::End`].
    pub async fn open(path: PathBuf, config: TailConfig) -> Result<Self, WatcherError> {
        let len = match open(&path).await {
            Ok(file) => Some(file.metadata().await?.len()),
            Err(WatcherError::FileDeleted(_)) if !config.must_exist => None,
            Err(e) => return Err(e),
        };

        let offset = match config.start {
            TailStart::Beginning => 0,
            TailStart::End => len.unwrap_or(0),
            TailStart::Offset(offset) => offset,
        };

        let (line_tx, lines) = mpsc::channel(LINE_BUFFER);
        let (error_tx, errors) = mpsc::channel(ERROR_BUFFER);
        let cancel = CancellationToken::new();

        let tailer = FileTailer::with_offset(path.clone(), offset);
        let task = tokio::spawn(run(
            tailer,
            config.interval,
            line_tx,
            error_tx,
            cancel.clone(),
        ));

        tracing::debug!(path = %path.display(), offset, "Line source started");
        Ok(Self {
            path,
            lines,
            errors,
            cancel,
            task,
        })
    }

    /// Path being tailed.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Borrow both receivers at once, for use in `select!`.
    pub fn channels(
        &mut self,
    ) -> (
        &mut mpsc::Receiver<String>,
        &mut mpsc::Receiver<WatcherError>,
    ) {
        (&mut self.lines, &mut self.errors)
    }

    /// Receive the next line. `None` once the task has stopped.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Stop the task and wait for it to exit.
    ///
    /// Returns lines that were read but not yet received, plus any lines
    /// appended to the file since the last read.
    pub async fn stop(mut self) -> Vec<String> {
        self.cancel.cancel();

        let mut remaining = Vec::new();
        while let Some(line) = self.lines.recv().await {
            remaining.push(line);
        }
        if let Err(e) = (&mut self.task).await {
            tracing::error!(path = %self.path.display(), error = %e, "Line source task failed");
        }

        tracing::debug!(
            path = %self.path.display(),
            remaining = remaining.len(),
            "Line source stopped"
        );
        remaining
    }
}

impl Drop for LineSource {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    mut tailer: FileTailer,
    interval: Duration,
    lines: mpsc::Sender<String>,
    errors: mpsc::Sender<WatcherError>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut missing_reported = false;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match tailer.read_new_lines().await {
            Ok(new_lines) => {
                missing_reported = false;
                if !forward(&lines, new_lines).await {
                    return;
                }
            }
            Err(WatcherError::FileDeleted(_)) if missing_reported => {}
            Err(e) => {
                if matches!(e, WatcherError::FileDeleted(_)) {
                    missing_reported = true;
                    // A recreated file starts over.
                    tailer.reset();
                }
                if errors.try_send(e).is_err() {
                    tracing::debug!(path = %tailer.path().display(), "Dropping tail error");
                }
            }
        }
    }

    // Lines written before the stop are still delivered to `stop`.
    if let Ok(rest) = tailer.read_new_lines().await {
        forward(&lines, rest).await;
    }
}

/// Send `batch` in order. Returns `false` once the receiver is gone.
async fn forward(lines: &mpsc::Sender<String>, batch: Vec<String>) -> bool {
    for line in batch {
        if lines.send(line).await.is_err() {
            return false;
        }
    }
    true
}
