//! Internal implementation of the identifier types.

use crate::{UuidError, UuidResult};
use chrono::{DateTime, Duration, DurationRound, NaiveDateTime, Utc};
use std::{fmt, str::FromStr};

/// Re-exported for convenience.
pub use ::uuid::Uuid;

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3f";

/// Canonical identifier of a consent grant (32 lowercase hex characters, no hyphens).
///
/// Once constructed the contained UUID is known to be canonical, so it can be used as a map
/// key, a path segment, or a JSON value without further checks.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GrantId(Uuid);

impl Default for GrantId {
    fn default() -> Self {
        Self::new()
    }
}

impl GrantId {
    /// Generates a new random (v4) grant id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Validates and parses an id that must already be in canonical form.
    ///
    /// Hyphenated or uppercase forms are rejected rather than normalised.
    ///
    /// # Errors
    ///
    /// Returns [`UuidError::InvalidInput`] if `input` is not canonical.
    pub fn parse(input: &str) -> UuidResult<Self> {
        if !Self::is_canonical(input) {
            return Err(UuidError::InvalidInput(format!(
                "grant id must be 32 lowercase hex characters without hyphens, got: '{}'",
                input
            )));
        }
        Uuid::parse_str(input)
            .map(Self)
            .map_err(|e| UuidError::InvalidInput(format!("invalid grant id '{}': {}", input, e)))
    }

    /// Returns true if `input` is in canonical form.
    pub fn is_canonical(input: &str) -> bool {
        input.len() == 32
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for GrantId {
    type Err = UuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GrantId::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for GrantId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for GrantId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        GrantId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A millisecond-precision UTC timestamp used as an identifier component.
///
/// Format: `YYYYMMDDTHHMMSS.mmmZ`, e.g. `20260111T143522.045Z`. Lexical order matches
/// chronological order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimestampId {
    timestamp: DateTime<Utc>,
}

impl TimestampId {
    /// Truncates `timestamp` to whole milliseconds.
    pub fn from_datetime(timestamp: DateTime<Utc>) -> Self {
        let timestamp = timestamp
            .duration_trunc(Duration::milliseconds(1))
            .unwrap_or(timestamp);
        Self { timestamp }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl FromStr for TimestampId {
    type Err = UuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let without_z = s.strip_suffix('Z').ok_or_else(|| {
            UuidError::InvalidInput(format!("timestamp id must end with 'Z': '{}'", s))
        })?;

        let naive = NaiveDateTime::parse_from_str(without_z, TIMESTAMP_FORMAT).map_err(|e| {
            UuidError::InvalidInput(format!("invalid timestamp id '{}': {}", s, e))
        })?;

        Ok(Self {
            timestamp: DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc),
        })
    }
}

impl fmt::Display for TimestampId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Z", self.timestamp.format(TIMESTAMP_FORMAT))
    }
}

/// Generates strictly increasing [`TimestampId`]s.
///
/// The generator is stateless: callers pass the most recent id they already hold (for example
/// the last document id in a subject's index) and must serialise calls for the same scope.
pub struct TimestampIdGenerator;

impl TimestampIdGenerator {
    /// Returns an id for `now`, bumped to one millisecond after `previous` when the clock has
    /// not moved past it.
    pub fn generate(previous: Option<&TimestampId>, now: DateTime<Utc>) -> TimestampId {
        let candidate = TimestampId::from_datetime(now);
        match previous {
            Some(prev) if candidate <= *prev => TimestampId {
                timestamp: prev.timestamp + Duration::milliseconds(1),
            },
            _ => candidate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_id_display_is_canonical() {
        let id = GrantId::new();
        let rendered = id.to_string();
        assert!(GrantId::is_canonical(&rendered));
        assert_eq!(GrantId::parse(&rendered).unwrap(), id);
    }

    #[test]
    fn grant_id_rejects_hyphenated_and_uppercase() {
        assert!(GrantId::parse("550e8400-e29b-41d4-a716-446655440000").is_err());
        assert!(GrantId::parse("550E8400E29B41D4A716446655440000").is_err());
        assert!(GrantId::parse("").is_err());
    }

    #[test]
    fn grant_id_serde_uses_canonical_string() {
        let id = GrantId::parse("550e8400e29b41d4a716446655440000").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"550e8400e29b41d4a716446655440000\"");
        let back: GrantId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn timestamp_id_formats_and_parses() {
        let ts = "2026-01-11T14:35:22.045678Z".parse::<DateTime<Utc>>().unwrap();
        let id = TimestampId::from_datetime(ts);
        assert_eq!(id.to_string(), "20260111T143522.045Z");
        let parsed: TimestampId = "20260111T143522.045Z".parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn timestamp_id_requires_z_suffix() {
        assert!("20260111T143522.045".parse::<TimestampId>().is_err());
        assert!("not-a-timestampZ".parse::<TimestampId>().is_err());
    }

    #[test]
    fn generator_is_strictly_increasing_within_one_millisecond() {
        let now = "2026-01-11T14:35:22.045Z".parse::<DateTime<Utc>>().unwrap();
        let first = TimestampIdGenerator::generate(None, now);
        let second = TimestampIdGenerator::generate(Some(&first), now);
        let third = TimestampIdGenerator::generate(Some(&second), now);
        assert!(first < second && second < third);
        assert_eq!(third.to_string(), "20260111T143522.047Z");
    }

    #[test]
    fn generator_uses_clock_once_it_moves_ahead() {
        let earlier = "2026-01-11T14:35:22.045Z".parse::<DateTime<Utc>>().unwrap();
        let later = "2026-01-11T14:40:00.000Z".parse::<DateTime<Utc>>().unwrap();
        let prev = TimestampIdGenerator::generate(None, earlier);
        let next = TimestampIdGenerator::generate(Some(&prev), later);
        assert_eq!(next.to_string(), "20260111T144000.000Z");
    }
}
