//! Last-N line extraction by scanning a file backwards.
//!
//! The file is read from the end in fixed-size chunks until enough
//! non-empty lines have been collected, so replaying the tail of a large log
//! only touches its last few kilobytes.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use super::error::{ReplayError, ReplayLimit};
use super::options::ReplayConfig;

/// Bytes read per backward step.
const CHUNK_SIZE: usize = 4096;

/// Byte budgets for a replay scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayLimits {
    /// Total bytes that may be read from the file.
    pub max_total_bytes: u64,
    /// Bytes a single kept line may hold, excluding its line ending.
    pub max_line_bytes: usize,
}

impl From<&ReplayConfig> for ReplayLimits {
    fn from(config: &ReplayConfig) -> Self {
        Self {
            max_total_bytes: config.max_total_bytes,
            max_line_bytes: config.max_line_bytes,
        }
    }
}

/// Lines returned by [`read_last_lines`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LastLines {
    /// Non-empty lines, oldest first.
    pub lines: Vec<String>,
    /// File size when the scan started. Tailing from here continues right
    /// after the replayed window.
    pub end_offset: u64,
    /// Start of the last entry of `lines` when the file does not end with a
    /// newline. A writer may still be appending to that line.
    pub partial_start: Option<u64>,
}

impl LastLines {
    /// Drop an unterminated last line and return the offset to tail from.
    ///
    /// Tailing from the returned offset reads the dropped line again once
    /// its newline is written.
    pub fn complete_lines(&mut self) -> u64 {
        match self.partial_start {
            Some(start) => {
                self.lines.pop();
                self.partial_start = None;
                start
            }
            None => self.end_offset,
        }
    }
}

/// Read the last `n` non-empty lines of `path`.
///
/// Line endings (`\n` or `\r\n`) are stripped and empty lines are skipped
/// without counting toward `n`.
///
/// # Errors
///
/// Returns [`ReplayError::LimitExceeded`] if reading would exceed
/// `max_total_bytes` or a kept line is longer than `max_line_bytes`, and
/// [`ReplayError::Io`] on read failures.
pub fn read_last_lines(
    path: &Path,
    n: usize,
    limits: &ReplayLimits,
) -> Result<LastLines, ReplayError> {
    read_last_lines_chunked(path, n, limits, CHUNK_SIZE)
}

fn read_last_lines_chunked(
    path: &Path,
    n: usize,
    limits: &ReplayLimits,
    chunk_size: usize,
) -> Result<LastLines, ReplayError> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();

    let mut collected = Collector::new(n, limits.max_line_bytes);
    let mut pos = size;
    let mut consumed: u64 = 0;
    // Bytes of the line that continues past the start of the current chunk.
    let mut carry: Vec<u8> = Vec::new();
    // Offset of the last newline in the file, once seen.
    let mut last_newline: Option<u64> = None;
    let mut partial_kept = false;
    let mut buf = vec![0u8; chunk_size];

    while pos > 0 && !collected.is_full() {
        let len = chunk_size.min(usize::try_from(pos).unwrap_or(chunk_size));
        if consumed + len as u64 > limits.max_total_bytes {
            return Err(ReplayError::LimitExceeded {
                kind: ReplayLimit::TotalBytes,
                limit: limits.max_total_bytes,
            });
        }
        pos -= len as u64;
        file.seek(SeekFrom::Start(pos))?;
        file.read_exact(&mut buf[..len])?;
        consumed += len as u64;

        let mut combined = Vec::with_capacity(len + carry.len());
        combined.extend_from_slice(&buf[..len]);
        combined.extend_from_slice(&carry);

        let mut end = combined.len();
        while let Some(nl) = combined[..end].iter().rposition(|&b| b == b'\n') {
            let kept = collected.push(&combined[nl + 1..end])?;
            if last_newline.is_none() {
                last_newline = Some(pos + nl as u64);
                partial_kept = kept;
            }
            end = nl;
            if collected.is_full() {
                break;
            }
        }
        combined.truncate(end);
        carry = combined;

        // The carry is the next line to be kept, so it can fail early.
        if !collected.is_full() {
            collected.check_len(&carry)?;
        }
    }

    if pos == 0 && !collected.is_full() {
        let kept = collected.push(&carry)?;
        if last_newline.is_none() {
            partial_kept = kept;
        }
    }

    let partial_start = partial_kept.then_some(last_newline.map_or(0, |nl| nl + 1));

    tracing::debug!(
        path = %path.display(),
        requested = n,
        returned = collected.lines.len(),
        bytes_read = consumed,
        "Replay scan finished"
    );

    Ok(LastLines {
        lines: collected.into_oldest_first(),
        end_offset: size,
        partial_start,
    })
}

/// Accumulates kept lines newest first.
struct Collector {
    lines: Vec<String>,
    want: usize,
    max_line_bytes: usize,
}

impl Collector {
    fn new(want: usize, max_line_bytes: usize) -> Self {
        Self {
            lines: Vec::with_capacity(want.min(1024)),
            want,
            max_line_bytes,
        }
    }

    fn is_full(&self) -> bool {
        self.lines.len() >= self.want
    }

    fn check_len(&self, raw: &[u8]) -> Result<(), ReplayError> {
        if strip_cr(raw).len() > self.max_line_bytes {
            return Err(ReplayError::LimitExceeded {
                kind: ReplayLimit::LineBytes,
                limit: self.max_line_bytes as u64,
            });
        }
        Ok(())
    }

    /// Keep `raw` if it is not empty. Returns whether it was kept.
    fn push(&mut self, raw: &[u8]) -> Result<bool, ReplayError> {
        let line = strip_cr(raw);
        if line.is_empty() {
            return Ok(false);
        }
        self.check_len(line)?;
        self.lines.push(String::from_utf8_lossy(line).into_owned());
        Ok(true)
    }

    fn into_oldest_first(mut self) -> Vec<String> {
        self.lines.reverse();
        self.lines
    }
}

fn strip_cr(raw: &[u8]) -> &[u8] {
    raw.strip_suffix(b"\r").unwrap_or(raw)
}
