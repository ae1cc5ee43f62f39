//! Composition of several parsers.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{ParseError, ParseResult, Parser};

/// How a [`ParserChain`] combines its parsers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainMode {
    /// Run every parser and concatenate events. The first error aborts the
    /// chain and nothing is returned.
    #[default]
    All,
    /// Stop at the first parser that reports a match.
    First,
    /// Run every parser, skipping failed ones. Errors are collected and
    /// returned together with the events of the parsers that succeeded.
    ContinueOnError,
}

/// Ordered list of parsers combined under a [`ChainMode`].
///
/// `None` entries are skipped, which lets callers build the list from
/// optional components without filtering it first.
#[derive(Clone, Default)]
pub struct ParserChain {
    parsers: Vec<Option<Arc<dyn Parser>>>,
    mode: ChainMode,
}

impl fmt::Debug for ParserChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserChain")
            .field("parsers", &self.parsers.len())
            .field("mode", &self.mode)
            .finish()
    }
}

impl ParserChain {
    /// Create an empty chain.
    #[must_use]
    pub fn new(mode: ChainMode) -> Self {
        Self {
            parsers: Vec::new(),
            mode,
        }
    }

    /// Create a chain from a list of parsers.
    #[must_use]
    pub fn from_parsers(mode: ChainMode, parsers: Vec<Option<Arc<dyn Parser>>>) -> Self {
        Self { parsers, mode }
    }

    /// Append a parser.
    #[must_use]
    pub fn with(mut self, parser: Arc<dyn Parser>) -> Self {
        self.parsers.push(Some(parser));
        self
    }

    /// Append a parser in place.
    pub fn push(&mut self, parser: Arc<dyn Parser>) {
        self.parsers.push(Some(parser));
    }

    /// The combination mode.
    #[must_use]
    pub fn mode(&self) -> ChainMode {
        self.mode
    }

    /// Number of entries, including `None` entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    /// Whether the chain has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }

    fn active(&self) -> impl Iterator<Item = &Arc<dyn Parser>> {
        self.parsers.iter().flatten()
    }

    async fn parse_all(
        &self,
        cancel: &CancellationToken,
        line: &str,
    ) -> Result<ParseResult, ParseError> {
        let mut acc = ParseResult::no_match();
        for parser in self.active() {
            if cancel.is_cancelled() {
                return Err(ParseError::Cancelled { partial: acc });
            }
            match parser.parse_line(cancel, line).await {
                Ok(result) => acc.extend(result),
                Err(mut err) if err.is_cancelled() => {
                    if let Some(partial) = err.take_partial() {
                        acc.extend(partial);
                    }
                    return Err(ParseError::Cancelled { partial: acc });
                }
                Err(err) => return Err(err.discard_partial()),
            }
        }
        Ok(acc)
    }

    async fn parse_first(
        &self,
        cancel: &CancellationToken,
        line: &str,
    ) -> Result<ParseResult, ParseError> {
        for parser in self.active() {
            if cancel.is_cancelled() {
                return Err(ParseError::Cancelled {
                    partial: ParseResult::no_match(),
                });
            }
            let result = parser.parse_line(cancel, line).await?;
            if result.matched {
                return Ok(result);
            }
        }
        Ok(ParseResult::no_match())
    }

    async fn parse_continue_on_error(
        &self,
        cancel: &CancellationToken,
        line: &str,
    ) -> Result<ParseResult, ParseError> {
        let mut acc = ParseResult::no_match();
        let mut errors = Vec::new();
        for parser in self.active() {
            if cancel.is_cancelled() {
                return Err(ParseError::Cancelled { partial: acc });
            }
            match parser.parse_line(cancel, line).await {
                Ok(result) => acc.extend(result),
                Err(mut err) => {
                    if let Some(partial) = err.take_partial() {
                        acc.extend(partial);
                    }
                    tracing::debug!(error = %err, "Parser failed, continuing chain");
                    errors.push(err);
                }
            }
        }

        if errors.is_empty() {
            Ok(acc)
        } else {
            Err(ParseError::Joined {
                partial: acc,
                errors,
            })
        }
    }
}

#[async_trait]
impl Parser for ParserChain {
    async fn parse_line(
        &self,
        cancel: &CancellationToken,
        line: &str,
    ) -> Result<ParseResult, ParseError> {
        match self.mode {
            ChainMode::All => self.parse_all(cancel, line).await,
            ChainMode::First => self.parse_first(cancel, line).await,
            ChainMode::ContinueOnError => self.parse_continue_on_error(cancel, line).await,
        }
    }
}
