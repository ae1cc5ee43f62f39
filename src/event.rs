//! Structured events produced from log lines.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Kind of a recognized occurrence.
///
/// Serialized as a plain string (`"player_join"`, ...). Pattern parsers
/// produce [`EventType::Custom`] with the type configured in their file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// A player joined the current instance.
    PlayerJoin,
    /// A player left the current instance.
    PlayerLeft,
    /// The local user joined a world instance.
    WorldJoin,
    /// Type defined by an extension parser.
    Custom(String),
}

impl EventType {
    /// The wire name of this type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::PlayerJoin => "player_join",
            Self::PlayerLeft => "player_left",
            Self::WorldJoin => "world_join",
            Self::Custom(name) => name,
        }
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "player_join" => Self::PlayerJoin,
            "player_left" => Self::PlayerLeft,
            "world_join" => Self::WorldJoin,
            _ => Self::Custom(value),
        }
    }
}

impl From<&str> for EventType {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        match value {
            EventType::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single event parsed from one log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event kind. Never empty.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Local time taken from the line's leading timestamp.
    pub timestamp: DateTime<Local>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    /// Extension payload, keyed by named capture group.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
    /// The source line, when the watcher is configured to keep it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_line: Option<String>,
}

impl Event {
    /// Create an event with no payload.
    #[must_use]
    pub fn new(event_type: EventType, timestamp: DateTime<Local>) -> Self {
        Self {
            event_type,
            timestamp,
            player_name: None,
            player_id: None,
            world_id: None,
            world_name: None,
            instance_id: None,
            data: BTreeMap::new(),
            raw_line: None,
        }
    }

    /// Set the player name and optional player id.
    #[must_use]
    pub fn with_player(mut self, name: impl Into<String>, id: Option<String>) -> Self {
        self.player_name = Some(name.into());
        self.player_id = id;
        self
    }

    /// Set the world id and instance id.
    #[must_use]
    pub fn with_world_instance(
        mut self,
        world_id: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Self {
        self.world_id = Some(world_id.into());
        self.instance_id = Some(instance_id.into());
        self
    }

    /// Set the world display name.
    #[must_use]
    pub fn with_world_name(mut self, name: impl Into<String>) -> Self {
        self.world_name = Some(name.into());
        self
    }

    /// Set the extension payload.
    #[must_use]
    pub fn with_data(mut self, data: BTreeMap<String, String>) -> Self {
        self.data = data;
        self
    }
}
