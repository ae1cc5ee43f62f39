//! vrclog - Structured events from VRChat log files.
//!
//! A [`Watcher`](watcher::Watcher) follows the active `output_log_*.txt`
//! file, runs every line through a [`Parser`](parser::Parser) and delivers
//! the resulting [`Event`](event::Event)s over a bounded channel.

pub mod config;
pub mod display;
pub mod event;
pub mod offline;
pub mod parser;
pub mod watcher;

pub use event::{Event, EventType};
pub use offline::OfflineParser;
pub use parser::{ChainMode, ParseResult, Parser, ParserChain, PatternParser, VrcParser};
pub use watcher::{ReplayMode, WatchOptions, Watcher, WatcherError};
