//! Event output for the CLI.
//!
//! Events are printed either as one JSON object per line or as a colored,
//! human-readable line.

use std::io::{self, Write};

use owo_colors::OwoColorize;
use serde::{Deserialize, Serialize};

use crate::event::{Event, EventType};

/// Maximum length for a value shown in pretty output.
const DEFAULT_MAX_LEN: usize = 80;

/// How events are written to stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Colored text.
    Pretty,
}

/// Truncate a string to a maximum length, adding ellipsis if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return "...".to_string();
    }
    let mut end = max_len - 3;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// Serialize an event as a single JSON line.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn format_json(event: &Event) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

fn details(event: &Event) -> String {
    let mut parts = Vec::new();
    if let Some(name) = &event.player_name {
        parts.push(name.bold().to_string());
    }
    if let Some(id) = &event.player_id {
        parts.push(format!("({})", id.dimmed()));
    }
    if let Some(name) = &event.world_name {
        parts.push(name.cyan().to_string());
    }
    if let Some(world) = &event.world_id {
        match &event.instance_id {
            Some(instance) => {
                parts.push(format!("{world}:{}", truncate(instance, DEFAULT_MAX_LEN)));
            }
            None => parts.push(world.clone()),
        }
    }
    for (key, value) in &event.data {
        parts.push(format!("{key}={}", truncate(value, DEFAULT_MAX_LEN)));
    }
    parts.join(" ")
}

/// Format an event as a colored line.
#[must_use]
pub fn format_pretty(event: &Event) -> String {
    let ts = event.timestamp.format("%Y-%m-%d %H:%M:%S").to_string();
    let tag = format!("[{}]", event.event_type.as_str().to_uppercase());
    let tag = match event.event_type {
        EventType::PlayerJoin => tag.green().bold().to_string(),
        EventType::PlayerLeft => tag.red().bold().to_string(),
        EventType::WorldJoin => tag.blue().bold().to_string(),
        EventType::Custom(_) => tag.yellow().bold().to_string(),
    };
    format!("{} {} {}", ts.dimmed(), tag, details(event))
        .trim_end()
        .to_string()
}

/// Write an event to `out` in the given format.
///
/// # Errors
///
/// Returns an error if the event cannot be serialized or written.
pub fn write_event(out: &mut impl Write, event: &Event, format: OutputFormat) -> io::Result<()> {
    match format {
        OutputFormat::Json => writeln!(out, "{}", format_json(event)?),
        OutputFormat::Pretty => writeln!(out, "{}", format_pretty(event)),
    }
}

/// Print an event to stdout.
///
/// # Errors
///
/// Returns an error if stdout is closed.
pub fn print_event(event: &Event, format: OutputFormat) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    write_event(&mut stdout, event, format)?;
    stdout.flush()
}

/// Print a fatal error to stderr.
pub fn print_fatal(err: &dyn std::fmt::Display) {
    eprintln!("{} {}", "[ERROR]".red().bold(), err);
}
