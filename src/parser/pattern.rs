//! User-defined regex patterns loaded from YAML.
//!
//! ```yaml
//! version: 1
//! patterns:
//!   - id: poker_hand
//!     event_type: poker_hand
//!     regex: 'Hand #(?P<hand>\d+) won by (?P<winner>.+)$'
//! ```
//!
//! Named capture groups become entries of [`Event::data`].

use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::cache::RegexCache;
use super::error::PatternError;
use super::timestamp::parse_timestamp;
use super::{ParseError, ParseResult, Parser};
use crate::event::{Event, EventType};

/// Schema version understood by this crate.
pub const SUPPORTED_PATTERN_VERSION: u32 = 1;

/// Largest pattern file accepted, in bytes.
pub const MAX_PATTERN_FILE_SIZE: u64 = 1024 * 1024;

/// Longest regex source accepted, in bytes.
pub const MAX_REGEX_LENGTH: usize = 512;

/// Deserialized pattern file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternFile {
    pub version: u32,
    #[serde(default)]
    pub patterns: Vec<PatternDef>,
}

/// One pattern entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDef {
    /// Stable identifier, unique within the file.
    #[serde(default)]
    pub id: String,
    /// Type of the emitted events.
    #[serde(default)]
    pub event_type: String,
    /// Regex matched against the whole line.
    #[serde(default)]
    pub regex: String,
}

impl PatternFile {
    /// Parse and validate YAML source.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed or fails [`Self::validate`].
    pub fn from_yaml(source: &str) -> Result<Self, PatternError> {
        let file: Self = serde_yaml::from_str(source)?;
        file.validate()?;
        Ok(file)
    }

    /// Read, parse and validate a pattern file.
    ///
    /// The file is opened first and then inspected through the open handle,
    /// so the checks apply to the file actually read.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not a regular file,
    /// exceeds [`MAX_PATTERN_FILE_SIZE`], or fails validation.
    pub fn load(path: &Path) -> Result<Self, PatternError> {
        let io_err = |source| PatternError::Io {
            path: path.to_path_buf(),
            source,
        };

        let file = std::fs::File::open(path).map_err(io_err)?;
        let metadata = file.metadata().map_err(io_err)?;
        if !metadata.is_file() {
            return Err(PatternError::NotRegularFile(path.to_path_buf()));
        }
        if metadata.len() > MAX_PATTERN_FILE_SIZE {
            return Err(PatternError::FileTooLarge {
                path: path.to_path_buf(),
                size: metadata.len(),
                limit: MAX_PATTERN_FILE_SIZE,
            });
        }

        // The file may grow after the size check.
        let mut content = String::new();
        file.take(MAX_PATTERN_FILE_SIZE + 1)
            .read_to_string(&mut content)
            .map_err(io_err)?;
        if content.len() as u64 > MAX_PATTERN_FILE_SIZE {
            return Err(PatternError::FileTooLarge {
                path: path.to_path_buf(),
                size: content.len() as u64,
                limit: MAX_PATTERN_FILE_SIZE,
            });
        }

        tracing::debug!(path = %path.display(), bytes = content.len(), "Loaded pattern file");
        Self::from_yaml(&content)
    }

    /// Check version, required fields, id uniqueness and regex length.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), PatternError> {
        if self.version != SUPPORTED_PATTERN_VERSION {
            return Err(PatternError::UnsupportedVersion {
                found: self.version,
                expected: SUPPORTED_PATTERN_VERSION,
            });
        }

        let mut seen = HashSet::new();
        for (index, def) in self.patterns.iter().enumerate() {
            if def.id.trim().is_empty() {
                return Err(PatternError::MissingField { index, field: "id" });
            }
            if def.event_type.trim().is_empty() {
                return Err(PatternError::MissingField {
                    index,
                    field: "event_type",
                });
            }
            if def.regex.is_empty() {
                return Err(PatternError::MissingField {
                    index,
                    field: "regex",
                });
            }
            if !seen.insert(def.id.as_str()) {
                return Err(PatternError::DuplicateId(def.id.clone()));
            }
            if def.regex.len() > MAX_REGEX_LENGTH {
                return Err(PatternError::RegexTooLong {
                    id: def.id.clone(),
                    len: def.regex.len(),
                    limit: MAX_REGEX_LENGTH,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct CompiledPattern {
    id: String,
    event_type: EventType,
    regex: Arc<Regex>,
}

/// Parser driven by a validated [`PatternFile`].
///
/// Every pattern that matches a line contributes one event, in file order.
#[derive(Debug)]
pub struct PatternParser {
    patterns: Vec<CompiledPattern>,
}

impl PatternParser {
    /// Load a pattern file and compile it through the global cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the file fails to load or a regex is invalid.
    pub fn from_file(path: &Path) -> Result<Self, PatternError> {
        Self::new(PatternFile::load(path)?)
    }

    /// Compile an already-parsed file through the global cache.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or a regex is invalid.
    pub fn new(file: PatternFile) -> Result<Self, PatternError> {
        Self::with_cache(file, RegexCache::global())
    }

    /// Compile an already-parsed file through `cache`.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or a regex is invalid.
    pub fn with_cache(file: PatternFile, cache: &RegexCache) -> Result<Self, PatternError> {
        file.validate()?;

        let patterns = file
            .patterns
            .into_iter()
            .map(|def| {
                let regex =
                    cache
                        .get_or_compile(&def.regex)
                        .map_err(|source| PatternError::InvalidRegex {
                            id: def.id.clone(),
                            source,
                        })?;
                Ok(CompiledPattern {
                    id: def.id,
                    event_type: EventType::from(def.event_type),
                    regex,
                })
            })
            .collect::<Result<Vec<_>, PatternError>>()?;

        Ok(Self { patterns })
    }

    /// Pattern ids in evaluation order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.id.as_str())
    }

    /// Number of patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the parser has no patterns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    fn parse(&self, line: &str) -> ParseResult {
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(timestamp) = parse_timestamp(line) else {
            return ParseResult::no_match();
        };

        let mut result = ParseResult::no_match();
        for pattern in &self.patterns {
            let Some(caps) = pattern.regex.captures(line) else {
                continue;
            };
            let data: BTreeMap<String, String> = pattern
                .regex
                .capture_names()
                .flatten()
                .filter_map(|name| {
                    caps.name(name)
                        .map(|m| (name.to_string(), m.as_str().to_string()))
                })
                .collect();
            result.extend(ParseResult::single(
                Event::new(pattern.event_type.clone(), timestamp).with_data(data),
            ));
        }
        result
    }
}

#[async_trait]
impl Parser for PatternParser {
    async fn parse_line(
        &self,
        _cancel: &CancellationToken,
        line: &str,
    ) -> Result<ParseResult, ParseError> {
        Ok(self.parse(line))
    }
}
