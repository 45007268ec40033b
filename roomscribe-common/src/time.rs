//! Timestamp utilities

use chrono::{DateTime, Local, TimeZone, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current unix time in milliseconds (ping payload)
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Format a timestamp as `YYYY/MM/DD HH:MM` in the given timezone
///
/// Used for the human-readable first column of the results log.
pub fn format_log_timestamp_in<Tz: TimeZone>(timestamp: DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    timestamp.with_timezone(tz).format("%Y/%m/%d %H:%M").to_string()
}

/// Format a timestamp as `YYYY/MM/DD HH:MM` in server-local time
pub fn format_log_timestamp(timestamp: DateTime<Utc>) -> String {
    format_log_timestamp_in(timestamp, &Local)
}
