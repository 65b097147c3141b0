use chrono::{DateTime, SecondsFormat, Utc};

/// Unix seconds.
pub fn now_ts() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Current time as ISO-8601 with a `Z` suffix, second precision.
pub fn iso_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses an ISO-8601 timestamp (with or without `Z`) into unix seconds.
pub fn parse_iso_ts(s: &str) -> Option<u64> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp().max(0) as u64)
}
