//! Timestamps for memory entries
//!
//! Entries carry a UTC creation timestamp serialized as RFC 3339. A store
//! stamps entries through a [`MonotonicClock`] so that two appends never share
//! a timestamp and later appends never sort before earlier ones, even if the
//! wall clock steps backwards.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::{Error, Result};

/// A point in time with microsecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current wall-clock time
    pub fn now() -> Self {
        Self::from_micros(Utc::now().timestamp_micros())
    }

    fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self::from_micros(dt.timestamp_micros())
    }

    /// Create from microseconds since Unix epoch
    pub fn from_micros(micros: i64) -> Self {
        Self(DateTime::from_timestamp_micros(micros).unwrap_or_else(Utc::now))
    }

    /// Parse an RFC 3339 / ISO-8601 timestamp
    pub fn parse(s: &str) -> Result<Self> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| Self::from_datetime(dt.with_timezone(&Utc)))
            .map_err(|e| Error::InvalidInput(format!("Invalid timestamp '{}': {}", s, e)))
    }

    /// Get as microseconds since Unix epoch
    pub fn as_micros(&self) -> i64 {
        self.0.timestamp_micros()
    }

    /// RFC 3339 rendering with microseconds, e.g. `2025-01-31T09:15:00.000123Z`
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

/// Strictly increasing clock for stamping entries within one store
#[derive(Debug)]
pub struct MonotonicClock {
    last_micros: AtomicI64,
}

impl MonotonicClock {
    /// Create a new clock
    pub fn new() -> Self {
        Self {
            last_micros: AtomicI64::new(i64::MIN),
        }
    }

    /// Next timestamp: the wall clock, or one microsecond after the previous
    /// tick if the wall clock has not advanced.
    pub fn tick(&self) -> Timestamp {
        let wall = Utc::now().timestamp_micros();
        let mut next = wall;
        // fetch_update only fails when the closure returns None
        let _ = self
            .last_micros
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                next = if wall > last { wall } else { last + 1 };
                Some(next)
            });
        Timestamp::from_micros(next)
    }

    /// Record an existing timestamp so later ticks sort after it
    ///
    /// Timestamps ahead of the wall clock are clamped to it; a stray future
    /// value must not drag every later tick along with it.
    pub fn observe(&self, ts: Timestamp) {
        let wall = Utc::now().timestamp_micros();
        self.last_micros
            .fetch_max(ts.as_micros().min(wall), Ordering::SeqCst);
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
