//! Leading timestamp field shared by every log line.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};

/// `chrono` format of the leading timestamp, e.g. `2024.01.15 23:59:59`.
pub const TIMESTAMP_FORMAT: &str = "%Y.%m.%d %H:%M:%S";

/// Width in bytes of the leading timestamp field.
pub const TIMESTAMP_LEN: usize = 19;

/// Extract the local timestamp at the start of `line`.
///
/// Returns `None` if the line is too short, the field is malformed, or the
/// local time does not exist (DST gap). Ambiguous local times resolve to the
/// earlier instant.
#[must_use]
pub fn parse_timestamp(line: &str) -> Option<DateTime<Local>> {
    let field = line.get(..TIMESTAMP_LEN)?;
    let naive = NaiveDateTime::parse_from_str(field, TIMESTAMP_FORMAT).ok()?;
    Local.from_local_datetime(&naive).earliest()
}
