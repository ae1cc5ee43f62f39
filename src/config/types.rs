//! Configuration file types.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::loader::ConfigError;
use crate::display::OutputFormat;
use crate::event::EventType;
use crate::parser::{ChainMode, Parser, ParserChain, PatternParser, VrcParser};
use crate::watcher::{
    ReplayConfig, ReplayMode, WatchOptions, DEFAULT_MAX_REPLAY_BYTES, DEFAULT_MAX_REPLAY_LINES,
    DEFAULT_MAX_REPLAY_LINE_BYTES, DEFAULT_POLL_INTERVAL,
};

/// Settings loaded from `vrclog.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VrclogConfig {
    /// Log directory override.
    pub log_dir: Option<PathBuf>,
    /// Rotation check and poll interval in milliseconds.
    pub poll_interval_ms: u64,
    pub include_raw_line: bool,
    pub wait_for_logs: bool,
    /// Event type names to emit. Empty means all.
    pub include_types: Vec<String>,
    /// Event type names to drop.
    pub exclude_types: Vec<String>,
    /// YAML pattern files run after the built-in parser.
    pub patterns: Vec<PathBuf>,
    /// How the built-in parser and pattern files are combined.
    pub chain_mode: ChainMode,
    pub replay: ReplaySection,
    pub output: OutputFormat,
}

impl Default for VrclogConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            poll_interval_ms: u64::try_from(DEFAULT_POLL_INTERVAL.as_millis()).unwrap_or(2000),
            include_raw_line: false,
            wait_for_logs: false,
            include_types: Vec::new(),
            exclude_types: Vec::new(),
            patterns: Vec::new(),
            chain_mode: ChainMode::default(),
            replay: ReplaySection::default(),
            output: OutputFormat::default(),
        }
    }
}

/// Which replay mode the `[replay]` section selects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayKind {
    #[default]
    None,
    FromStart,
    LastN,
    Since,
}

/// The `[replay]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaySection {
    pub mode: ReplayKind,
    /// Line count for `mode = "last_n"`.
    pub last_n: Option<usize>,
    /// RFC 3339 time for `mode = "since"`.
    pub since: Option<DateTime<Local>>,
    pub max_lines: usize,
    pub max_total_bytes: u64,
    pub max_line_bytes: usize,
}

impl Default for ReplaySection {
    fn default() -> Self {
        Self {
            mode: ReplayKind::None,
            last_n: None,
            since: None,
            max_lines: DEFAULT_MAX_REPLAY_LINES,
            max_total_bytes: DEFAULT_MAX_REPLAY_BYTES,
            max_line_bytes: DEFAULT_MAX_REPLAY_LINE_BYTES,
        }
    }
}

impl ReplaySection {
    /// Convert to a [`ReplayConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the mode needs a value that is
    /// missing.
    pub fn to_replay_config(&self) -> Result<ReplayConfig, ConfigError> {
        let mode = match self.mode {
            ReplayKind::None => ReplayMode::None,
            ReplayKind::FromStart => ReplayMode::FromStart,
            ReplayKind::LastN => ReplayMode::LastN(self.last_n.ok_or_else(|| {
                ConfigError::Invalid("replay mode \"last_n\" requires last_n".to_string())
            })?),
            ReplayKind::Since => ReplayMode::Since(self.since.ok_or_else(|| {
                ConfigError::Invalid("replay mode \"since\" requires since".to_string())
            })?),
        };
        Ok(ReplayConfig {
            mode,
            max_lines: self.max_lines,
            max_total_bytes: self.max_total_bytes,
            max_line_bytes: self.max_line_bytes,
        })
    }
}

impl VrclogConfig {
    /// Build the line parser: the built-in parser alone, or chained with
    /// every configured pattern file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Pattern`] if a pattern file fails to load.
    pub fn build_parser(&self) -> Result<Arc<dyn Parser>, ConfigError> {
        if self.patterns.is_empty() {
            return Ok(Arc::new(VrcParser::new()));
        }

        let mut chain = ParserChain::new(self.chain_mode).with(Arc::new(VrcParser::new()));
        for path in &self.patterns {
            let parser = PatternParser::from_file(path)?;
            tracing::debug!(
                path = %path.display(),
                patterns = parser.len(),
                "Loaded pattern file"
            );
            chain.push(Arc::new(parser));
        }
        Ok(Arc::new(chain))
    }

    /// Build watcher options from this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the replay section is incomplete or a pattern
    /// file fails to load.
    pub fn to_watch_options(&self) -> Result<WatchOptions, ConfigError> {
        let mut options = WatchOptions::new()
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_raw_line(self.include_raw_line)
            .with_wait_for_logs(self.wait_for_logs)
            .with_include_types(self.include_types.iter().map(|t| EventType::from(t.as_str())))
            .with_exclude_types(self.exclude_types.iter().map(|t| EventType::from(t.as_str())))
            .with_replay_config(self.replay.to_replay_config()?)
            .with_parser(self.build_parser()?);
        if let Some(dir) = &self.log_dir {
            options = options.with_log_dir(dir);
        }
        Ok(options)
    }
}
