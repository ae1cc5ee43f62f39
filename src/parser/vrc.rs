//! Built-in parser for standard VRChat log statements.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use super::timestamp::parse_timestamp;
use super::{ParseError, ParseResult, Parser};
use crate::event::{Event, EventType};

static PLAYER_JOIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[Behaviour\] OnPlayerJoined (.+?)(?:\s+\((usr_[0-9a-fA-F-]+)\))?\s*$")
        .expect("valid regex")
});

static PLAYER_LEFT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[Behaviour\] OnPlayerLeft (.+?)(?:\s+\((usr_[0-9a-fA-F-]+)\))?\s*$")
        .expect("valid regex")
});

static WORLD_JOINING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[Behaviour\] Joining (wrld_[0-9a-fA-F-]+):(\S+)").expect("valid regex")
});

static WORLD_ENTERING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[Behaviour\] Entering Room: (.+?)\s*$").expect("valid regex")
});

/// Statements that share a prefix with a recognized pattern but mean
/// something else.
const EXCLUSIONS: &[&str] = &["OnPlayerLeftRoom", "Joining or Creating Room"];

/// Recognizes player join/leave and world join statements.
///
/// Lines without the leading timestamp field are never matched.
#[derive(Debug, Clone, Copy, Default)]
pub struct VrcParser;

impl VrcParser {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Parse a line synchronously. Returns `None` if it is not recognized.
    #[must_use]
    pub fn parse(line: &str) -> Option<Event> {
        let line = line.trim_end_matches(['\r', '\n']);
        let timestamp = parse_timestamp(line)?;

        if !line.contains("[Behaviour]") {
            return None;
        }
        if EXCLUSIONS.iter().any(|ex| line.contains(ex)) {
            return None;
        }

        if let Some(caps) = PLAYER_JOIN.captures(line) {
            let id = caps.get(2).map(|m| m.as_str().to_string());
            return Some(Event::new(EventType::PlayerJoin, timestamp).with_player(&caps[1], id));
        }
        if let Some(caps) = PLAYER_LEFT.captures(line) {
            let id = caps.get(2).map(|m| m.as_str().to_string());
            return Some(Event::new(EventType::PlayerLeft, timestamp).with_player(&caps[1], id));
        }
        if let Some(caps) = WORLD_JOINING.captures(line) {
            return Some(
                Event::new(EventType::WorldJoin, timestamp).with_world_instance(&caps[1], &caps[2]),
            );
        }
        if let Some(caps) = WORLD_ENTERING.captures(line) {
            return Some(Event::new(EventType::WorldJoin, timestamp).with_world_name(&caps[1]));
        }

        None
    }
}

#[async_trait]
impl Parser for VrcParser {
    async fn parse_line(
        &self,
        _cancel: &CancellationToken,
        line: &str,
    ) -> Result<ParseResult, ParseError> {
        Ok(Self::parse(line).map_or_else(ParseResult::no_match, ParseResult::single))
    }
}
