//! Timestamp parsing and time windows.

use crate::GeneratorError;
use chrono::{DateTime, Duration, Utc};

/// Parse an RFC 3339 timestamp, or a bare `YYYY-MM-DD` date at midnight UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, GeneratorError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| GeneratorError::InvalidTimestamp(s.to_string()))
}

/// A `[start, end)` window split into equal steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    span_nanos: i64,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, GeneratorError> {
        if end < start {
            return Err(GeneratorError::InvertedWindow {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        let span_nanos = end
            .signed_duration_since(start)
            .num_nanoseconds()
            .ok_or_else(|| GeneratorError::WindowTooLarge {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            })?;
        Ok(Self {
            start,
            end,
            span_nanos,
        })
    }

    /// The 24 hours following `start`.
    pub fn day_from(start: DateTime<Utc>) -> Self {
        let length = Duration::hours(24);
        Self {
            start,
            end: start + length,
            span_nanos: length.num_nanoseconds().unwrap_or(i64::MAX),
        }
    }

    /// Parse both bounds as RFC 3339.
    pub fn parse(start: &str, end: &str) -> Result<Self, GeneratorError> {
        Self::new(parse_timestamp(start)?, parse_timestamp(end)?)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Length of one of `count` equal steps, truncated to whole nanoseconds.
    pub fn step(&self, count: u64) -> Duration {
        if count == 0 {
            return Duration::zero();
        }
        Duration::nanoseconds(self.span_nanos / count as i64)
    }

    /// Timestamp of step `index` out of `count`.
    pub fn at(&self, index: u64, count: u64) -> DateTime<Utc> {
        let step = self.step(count).num_nanoseconds().unwrap_or(0);
        self.start + Duration::nanoseconds(step.saturating_mul(index as i64))
    }
}
