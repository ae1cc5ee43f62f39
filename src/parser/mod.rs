//! Line parsers.
//!
//! A [`Parser`] turns one raw log line into zero or more [`Event`]s. The
//! built-in [`VrcParser`] recognizes the standard VRChat statements,
//! [`PatternParser`] runs user-defined regex patterns loaded from YAML, and
//! [`ParserChain`] combines any number of parsers under a [`ChainMode`].

mod cache;
mod chain;
mod error;
mod pattern;
mod timestamp;
mod vrc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::event::Event;

pub use cache::RegexCache;
pub use chain::{ChainMode, ParserChain};
pub use error::{ParseError, PatternError};
pub use pattern::{
    PatternDef, PatternFile, PatternParser, MAX_PATTERN_FILE_SIZE, MAX_REGEX_LENGTH,
    SUPPORTED_PATTERN_VERSION,
};
pub use timestamp::{parse_timestamp, TIMESTAMP_FORMAT, TIMESTAMP_LEN};
pub use vrc::VrcParser;

/// Outcome of parsing one line.
///
/// `matched == false` always comes with no events. `matched == true` with no
/// events means the line was recognized and intentionally produced nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseResult {
    pub events: Vec<Event>,
    pub matched: bool,
}

impl ParseResult {
    /// The line was not recognized.
    #[must_use]
    pub fn no_match() -> Self {
        Self::default()
    }

    /// The line was recognized and produced `events` (possibly none).
    #[must_use]
    pub fn matched(events: Vec<Event>) -> Self {
        Self {
            events,
            matched: true,
        }
    }

    /// Convenience for a single recognized event.
    #[must_use]
    pub fn single(event: Event) -> Self {
        Self::matched(vec![event])
    }

    /// Merge another result into this one, keeping event order.
    pub fn extend(&mut self, other: ParseResult) {
        self.matched |= other.matched;
        self.events.extend(other.events);
    }
}

/// Converts a raw line into structured events.
///
/// An unrecognized line is `Ok(ParseResult::no_match())`. `Err` is reserved
/// for unexpected failures; errors from composite parsers may carry a
/// partial result, see [`ParseError::partial`].
#[async_trait]
pub trait Parser: Send + Sync {
    /// Parse a single line.
    async fn parse_line(
        &self,
        cancel: &CancellationToken,
        line: &str,
    ) -> Result<ParseResult, ParseError>;
}
