// engram-core/src/time.rs
// ============================================================================
// Module: Timestamp
// Description: ISO-8601 UTC timestamp type used on every stored entity.
// Purpose: Give the store and audit log a single, serde-friendly wall-clock
// representation.
// Dependencies: chrono, serde
// ============================================================================

//! ## Overview
//! `Timestamp` wraps `chrono::DateTime<Utc>` and always serializes as an
//! RFC 3339 string with millisecond precision. Timestamps are stamped by
//! the store at insert time; they are never part of an entity's content id,
//! since two identical submissions separated in time must still resolve to
//! the same row.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::error::EngramError;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// A UTC point in time, serialized as RFC 3339 with millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Wraps an existing `DateTime<Utc>`.
    #[must_use]
    pub const fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the inner `DateTime<Utc>`.
    #[must_use]
    pub const fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Renders as an RFC 3339 string with millisecond precision.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Parses an RFC 3339 string.
    ///
    /// # Errors
    /// Returns [`EngramError::InvalidInput`] if `raw` is not a valid RFC
    /// 3339 timestamp.
    pub fn parse(raw: &str) -> Result<Self, EngramError> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| Self(dt.with_timezone(&Utc)))
            .map_err(|err| EngramError::InvalidInput(format!("invalid timestamp '{raw}': {err}")))
    }

    /// Returns the number of whole milliseconds since the Unix epoch.
    #[must_use]
    pub fn unix_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl TryFrom<String> for Timestamp {
    type Error = EngramError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<Timestamp> for String {
    fn from(timestamp: Timestamp) -> Self {
        timestamp.to_rfc3339()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test assertions need direct unwraps")]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_rfc3339() {
        let now = Timestamp::now();
        let rendered = now.to_rfc3339();
        let parsed = Timestamp::parse(&rendered).unwrap();
        assert_eq!(now.unix_millis(), parsed.unix_millis());
    }

    #[test]
    fn rejects_non_rfc3339_input() {
        assert!(Timestamp::parse("not-a-timestamp").is_err());
    }

    #[test]
    fn serde_round_trip_preserves_millis() {
        let now = Timestamp::now();
        let json = serde_json::to_string(&now).unwrap();
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(now.unix_millis(), back.unix_millis());
    }
}
