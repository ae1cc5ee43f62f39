//! Parser error types.

use std::path::PathBuf;

use super::ParseResult;

/// Errors returned from [`Parser::parse_line`](super::Parser::parse_line).
///
/// Composite parsers report failures together with whatever they had
/// already produced; see [`ParseError::partial`].
#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    /// Cancellation was observed between parsers.
    #[error("Parse cancelled")]
    Cancelled {
        /// Events and match state accumulated before cancellation.
        partial: ParseResult,
    },

    /// One or more parsers in a continue-on-error chain failed.
    #[error("{count} parser(s) failed: {summary}", count = .errors.len(), summary = join_messages(.errors))]
    Joined {
        /// Result of the parsers that succeeded.
        partial: ParseResult,
        /// Errors in parser order.
        errors: Vec<ParseError>,
    },

    /// Failure reported by a parser implementation.
    #[error("Parser failed: {0}")]
    Custom(#[source] Box<dyn std::error::Error + Send + Sync>),
}

fn join_messages(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ParseError {
    /// Wrap an arbitrary error from a parser implementation.
    pub fn custom(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Custom(err.into())
    }

    /// Result produced before the failure, if any was kept.
    #[must_use]
    pub fn partial(&self) -> Option<&ParseResult> {
        match self {
            Self::Cancelled { partial } | Self::Joined { partial, .. } => Some(partial),
            Self::Custom(_) => None,
        }
    }

    /// Move the partial result out, leaving an empty one behind.
    pub fn take_partial(&mut self) -> Option<ParseResult> {
        match self {
            Self::Cancelled { partial } | Self::Joined { partial, .. } => {
                Some(std::mem::take(partial))
            }
            Self::Custom(_) => None,
        }
    }

    /// Drop any partial result carried by this error.
    #[must_use]
    pub fn discard_partial(mut self) -> Self {
        let _ = self.take_partial();
        self
    }

    /// Whether this error was caused by cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Errors loading or validating a YAML pattern file.
#[derive(thiserror::Error, Debug)]
pub enum PatternError {
    #[error("Failed to read pattern file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Pattern file is not a regular file: {0}")]
    NotRegularFile(PathBuf),

    #[error("Pattern file {path} is {size} bytes, limit is {limit}")]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("Failed to parse pattern file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unsupported pattern file version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Pattern #{index} is missing `{field}`")]
    MissingField { index: usize, field: &'static str },

    #[error("Duplicate pattern id: {0}")]
    DuplicateId(String),

    #[error("Pattern {id}: regex is {len} bytes, limit is {limit}")]
    RegexTooLong { id: String, len: usize, limit: usize },

    #[error("Pattern {id}: invalid regex: {source}")]
    InvalidRegex { id: String, source: regex::Error },
}
