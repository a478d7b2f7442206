//! Time types for rewind.
//!
//! Recorded timestamps are wall clock, metadata only. Replay never reads
//! the clock to decide anything.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

/// Wall clock timestamp recorded on a span or event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Wrap a chrono datetime
    #[must_use]
    pub fn new(inner: DateTime<Utc>) -> Self {
        Self(inner)
    }

    /// Create from fractional seconds since the Unix epoch
    ///
    /// # Errors
    ///
    /// Returns error if the value is not finite or out of range
    pub fn from_epoch_secs(secs: f64) -> CoreResult<Self> {
        if !secs.is_finite() {
            return Err(CoreError::InvalidTimestamp {
                reason: format!("non-finite epoch value {}", secs),
            });
        }
        let whole = secs.floor();
        let nanos = ((secs - whole) * 1_000_000_000.0).round() as u32;
        Utc.timestamp_opt(whole as i64, nanos.min(999_999_999))
            .single()
            .map(Self)
            .ok_or_else(|| CoreError::InvalidTimestamp {
                reason: format!("epoch value {} out of range", secs),
            })
    }

    /// Parse an RFC 3339 string
    ///
    /// # Errors
    ///
    /// Returns error if the string is not RFC 3339
    pub fn parse(s: &str) -> CoreResult<Self> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| Self(dt.with_timezone(&Utc)))
            .map_err(|e| CoreError::InvalidTimestamp {
                reason: format!("{}: {}", s, e),
            })
    }

    /// Get the inner datetime
    #[must_use]
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Elapsed time since an earlier timestamp, zero if `earlier` is later
    #[must_use]
    pub fn duration_since(&self, earlier: &Timestamp) -> Duration {
        (self.0 - earlier.0).to_std().unwrap_or(Duration::ZERO)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Epoch(f64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Timestamp::parse(&s).map_err(serde::de::Error::custom),
            Raw::Epoch(secs) => Timestamp::from_epoch_secs(secs).map_err(serde::de::Error::custom),
        }
    }
}

/// Serde helpers encoding a `Duration` as fractional milliseconds
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize as milliseconds
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64() * 1_000.0)
    }

    /// Deserialize from milliseconds
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = f64::deserialize(deserializer)?;
        if !millis.is_finite() || millis < 0.0 {
            return Err(serde::de::Error::custom(format!(
                "invalid duration {}ms",
                millis
            )));
        }
        Ok(Duration::from_secs_f64(millis / 1_000.0))
    }
}
