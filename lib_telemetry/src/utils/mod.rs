//! # Utilities Module
//!
//! General-purpose helpers shared across the crate: identifier generation and
//! wall-clock timestamps.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Returns a fresh random (v4) identifier in its hyphenated string form.
///
/// Used for durable user ids and per-run session ids. Collisions are
/// negligible for this purpose; the value is not a security token.
pub fn new_identifier() -> String {
    Uuid::new_v4().to_string()
}

/// Current UTC time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current UTC time formatted as an RFC 3339 string with millisecond precision.
pub fn current_datetime_rfc3339() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_unique_and_hyphenated() {
        let a = new_identifier();
        let b = new_identifier();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
        assert_eq!(a.matches('-').count(), 4);
    }

    #[test]
    fn rfc3339_has_millisecond_precision() {
        let ts = current_datetime_rfc3339();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2024-01-01T00:00:00.000Z".len());
    }
}
