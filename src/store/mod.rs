//! Reading store abstraction.
//!
//! The estimator and aggregator only see the three queries on `ReadingStore`;
//! backing stores normalize timestamps to UTC before readings reach them.

use crate::sensor::SensorId;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use std::fmt;
use thiserror::Error;

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub sensor_id: SensorId,
    pub timestamp: DateTime<Utc>,
    pub voltage: Option<f64>,
    pub temperature: Option<f64>,
}

/// Per-hour usage for one sensor on one weekday, in reference-timezone hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourlyUsage {
    pub hour: u32,
    pub distinct_days: u32,
    pub reading_count: u64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("reading log i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("reading log entry is not valid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("reading log entry is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("store lock poisoned")]
    Lock,
}

pub trait ReadingStore: Send + Sync + fmt::Debug {
    /// Pick up readings recorded by other writers since the last refresh.
    /// Queries in between see one fixed snapshot.
    fn refresh(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Most recent readings for a sensor, newest first.
    fn fetch_recent(&self, sensor_id: &str, limit: usize) -> Result<Vec<Reading>, StoreError>;

    /// Readings on the given local weekday grouped by local hour, ascending.
    /// Hours without readings are omitted.
    fn fetch_grouped_by_hour(
        &self,
        sensor_id: &str,
        weekday: Weekday,
    ) -> Result<Vec<HourlyUsage>, StoreError>;

    /// Distinct local calendar dates on the given weekday with at least one reading.
    fn fetch_total_days(&self, sensor_id: &str, weekday: Weekday) -> Result<u32, StoreError>;
}

/// Parse a stored timestamp into UTC.
///
/// RFC 3339 values carry their own offset. Naive values (`2025-03-31 14:05:00`)
/// are wall-clock times in `timezone`; ambiguous times during a DST fall-back
/// resolve to the earlier instant and skipped spring-forward times are rejected.
pub fn normalize_timestamp(raw: &str, timezone: Tz) -> Result<DateTime<Utc>, StoreError> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .ok_or_else(|| StoreError::InvalidTimestamp(raw.to_string()))?;

    timezone
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| {
            StoreError::InvalidTimestamp(format!("{raw} does not exist in {}", timezone.name()))
        })
}
