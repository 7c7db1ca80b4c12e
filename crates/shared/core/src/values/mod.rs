use chrono::{DateTime, TimeZone, Utc};

/// Timestamp in UTC
pub type Timestamp = DateTime<Utc>;

/// Identifier of a user account
pub type UserId = i64;

/// Identifier of a status (post)
pub type StatusId = i64;

/// Identifier of a direct message
pub type MessageId = i64;

/// Identifier of a user list
pub type ListId = i64;

/// Format of `created_at` fields, e.g. `Wed Aug 27 13:08:45 +0000 2008`
pub const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Parse a decimal string of milliseconds since the Unix epoch
/// (`timestamp_ms` fields).
pub fn parse_epoch_millis(value: &str) -> Option<Timestamp> {
    let millis: i64 = value.trim().parse().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

/// Parse a `created_at` string.
///
/// Accepts the stream's native format and falls back to RFC 2822.
pub fn parse_created_at(value: &str) -> Option<Timestamp> {
    let value = value.trim();
    DateTime::parse_from_str(value, CREATED_AT_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc2822(value))
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
