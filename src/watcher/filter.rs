//! Per-event filtering shared by replayed, live and offline lines.

use std::collections::HashSet;

use chrono::{DateTime, Local};

use super::options::{ReplayMode, WatchOptions};
use crate::event::{Event, EventType};

/// Decides which parsed events are delivered and how they are decorated.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    include: HashSet<EventType>,
    exclude: HashSet<EventType>,
    since: Option<DateTime<Local>>,
    include_raw_line: bool,
}

impl EventFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the filter described by watcher options.
    #[must_use]
    pub fn from_options(options: &WatchOptions) -> Self {
        let since = match options.replay.mode {
            ReplayMode::Since(since) => Some(since),
            _ => None,
        };
        Self {
            include: options.include_types.clone(),
            exclude: options.exclude_types.clone(),
            since,
            include_raw_line: options.include_raw_line,
        }
    }

    #[must_use]
    pub fn with_include(mut self, types: impl IntoIterator<Item = EventType>) -> Self {
        self.include = types.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_exclude(mut self, types: impl IntoIterator<Item = EventType>) -> Self {
        self.exclude = types.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_since(mut self, since: Option<DateTime<Local>>) -> Self {
        self.since = since;
        self
    }

    #[must_use]
    pub fn with_raw_line(mut self, include: bool) -> Self {
        self.include_raw_line = include;
        self
    }

    /// Whether events of `event_type` pass the type filters.
    #[must_use]
    pub fn allows_type(&self, event_type: &EventType) -> bool {
        if self.exclude.contains(event_type) {
            return false;
        }
        self.include.is_empty() || self.include.contains(event_type)
    }

    /// Filter `event` and attach `line` if configured.
    ///
    /// Events with an empty type are always dropped.
    #[must_use]
    pub fn apply(&self, mut event: Event, line: &str) -> Option<Event> {
        if event.event_type.as_str().is_empty() {
            tracing::debug!(line, "Dropping event with empty type");
            return None;
        }
        if self.since.is_some_and(|since| event.timestamp < since) {
            return None;
        }
        if !self.allows_type(&event.event_type) {
            return None;
        }
        if self.include_raw_line {
            event.raw_line = Some(line.to_string());
        }
        Some(event)
    }
}
