use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

/// SQLite rows carry timestamps either as RFC 3339 (explicit inserts) or as
/// `YYYY-MM-DD HH:MM:SS` (datetime('now') column defaults). Parse both,
/// treating the naive form as UTC.
pub(crate) fn parse_db_timestamp(value: &str, context: &str) -> DateTime<Utc> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on {}: {}", value, context, e);
            DateTime::default()
        })
}

pub(crate) fn parse_db_uuid(value: &str, context: &str) -> Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt id '{}' on {}: {}", value, context, e);
        Uuid::default()
    })
}
