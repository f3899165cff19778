//! Hourly popularity profile for one sensor on one day of the week.
//!
//! Sampling assumption: a running machine reports once a minute, so
//! `readings_per_busy_hour` readings in an hour (averaged over the days that
//! had any reading in that hour) count as a fully busy hour.

use crate::config::MonitorConfig;
use crate::error::AppError;
use crate::estimation::{StatusReport, estimate};
use crate::sensor::SensorKind;
use crate::store::{HourlyUsage, ReadingStore};
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use std::ops::Range;

pub const DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

const CURRENT_TIME_FORMAT: &str = "%I:%M %p";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FacilityConfig {
    /// First displayed hour; also when the room opens.
    pub open_hour: u32,
    /// Closing hour, exclusive. The last displayed bucket is `close_hour - 1`.
    pub close_hour: u32,
    pub readings_per_busy_hour: f64,
}

impl Default for FacilityConfig {
    fn default() -> Self {
        Self {
            open_hour: 7,
            close_hour: 22,
            readings_per_busy_hour: 60.0,
        }
    }
}

impl FacilityConfig {
    pub fn display_hours(&self) -> Range<u32> {
        self.open_hour..self.close_hour
    }

    pub fn is_open_at(&self, hour: u32) -> bool {
        self.display_hours().contains(&hour)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyCategory {
    NotBusy,
    NotTooBusy,
    FairlyBusy,
    VeryBusy,
}

impl BusyCategory {
    /// Lower bounds are inclusive: exactly 25 is already "Not too busy".
    pub fn from_percentage(percentage: u8) -> Self {
        match percentage {
            0..25 => Self::NotBusy,
            25..50 => Self::NotTooBusy,
            50..75 => Self::FairlyBusy,
            _ => Self::VeryBusy,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::NotBusy => "Not busy",
            Self::NotTooBusy => "Not too busy",
            Self::FairlyBusy => "Fairly busy",
            Self::VeryBusy => "Very busy",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HourBucket {
    pub hour: u32,
    /// "7:00"
    pub label: String,
    /// "7–8AM"
    pub range_label: String,
    pub busy_percentage: u8,
    pub category: BusyCategory,
    pub distinct_days: u32,
    pub reading_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PopularityProfile {
    pub sensor_id: String,
    pub day_index: u8,
    pub day_name: &'static str,
    pub is_current_day: bool,
    /// Local wall-clock time at `now`, "03:15 PM"
    pub current_time: String,
    /// Distinct dates observed on this weekday; at least 1.
    pub total_days: u32,
    pub current_hour_index: Option<usize>,
    pub is_open: bool,
    pub buckets: Vec<HourBucket>,
    pub status: StatusReport,
}

/// Sunday = 0 … Saturday = 6.
pub fn weekday_from_index(day_index: u8) -> Option<Weekday> {
    match day_index {
        0 => Some(Weekday::Sun),
        1..=6 => Weekday::try_from(day_index - 1).ok(),
        _ => None,
    }
}

pub fn weekday_index(weekday: Weekday) -> u8 {
    weekday.num_days_from_sunday() as u8
}

/// Ties round to even: 12.5 becomes 12 and 24.5 becomes 24.
pub fn busy_percentage(avg_per_day: f64, readings_per_busy_hour: f64) -> u8 {
    (avg_per_day / readings_per_busy_hour * 100.0)
        .round_ties_even()
        .clamp(0.0, 100.0) as u8
}

pub fn hour_label(hour: u32) -> String {
    format!("{}:00", twelve_hour(hour))
}

pub fn hour_range_label(hour: u32) -> String {
    let next = (hour + 1) % 24;
    let suffix = if next < 12 { "AM" } else { "PM" };
    format!("{}–{}{suffix}", twelve_hour(hour), twelve_hour(next))
}

fn twelve_hour(hour: u32) -> u32 {
    match hour % 12 {
        0 => 12,
        h => h,
    }
}

fn bucket(hour: u32, usage: Option<&HourlyUsage>, facility: &FacilityConfig) -> HourBucket {
    let (distinct_days, reading_count) = usage
        .map(|u| (u.distinct_days, u.reading_count))
        .unwrap_or((0, 0));
    let avg_per_day = if distinct_days > 0 {
        reading_count as f64 / f64::from(distinct_days)
    } else {
        0.0
    };
    let busy_percentage = busy_percentage(avg_per_day, facility.readings_per_busy_hour);

    HourBucket {
        hour,
        label: hour_label(hour),
        range_label: hour_range_label(hour),
        busy_percentage,
        category: BusyCategory::from_percentage(busy_percentage),
        distinct_days,
        reading_count,
    }
}

/// Profile for `day_index` (Sunday = 0). The current status is estimated at
/// `now` and attached for context.
pub fn aggregate(
    store: &dyn ReadingStore,
    sensor_id: &str,
    kind: &SensorKind,
    day_index: u8,
    now: DateTime<Utc>,
    config: &MonitorConfig,
) -> Result<PopularityProfile, AppError> {
    let weekday = weekday_from_index(day_index).ok_or(AppError::InvalidDay(day_index))?;
    let status = estimate(store, sensor_id, kind, now, config)?;
    build_profile(store, sensor_id, weekday, now, config, status)
}

/// Profiles for Sunday through Saturday sharing one status estimate.
pub fn aggregate_week(
    store: &dyn ReadingStore,
    sensor_id: &str,
    kind: &SensorKind,
    now: DateTime<Utc>,
    config: &MonitorConfig,
) -> Result<Vec<PopularityProfile>, AppError> {
    let status = estimate(store, sensor_id, kind, now, config)?;
    (0..7u8)
        .filter_map(weekday_from_index)
        .map(|weekday| build_profile(store, sensor_id, weekday, now, config, status.clone()))
        .collect()
}

fn build_profile(
    store: &dyn ReadingStore,
    sensor_id: &str,
    weekday: Weekday,
    now: DateTime<Utc>,
    config: &MonitorConfig,
    status: StatusReport,
) -> Result<PopularityProfile, AppError> {
    let facility = &config.facility;
    let local_now = now.with_timezone(&config.timezone);
    let is_current_day = local_now.weekday() == weekday;

    let usage = store.fetch_grouped_by_hour(sensor_id, weekday)?;
    let total_days = store.fetch_total_days(sensor_id, weekday)?.max(1);

    let buckets = facility
        .display_hours()
        .map(|hour| bucket(hour, usage.iter().find(|u| u.hour == hour), facility))
        .collect();
    let current_hour_index = if is_current_day {
        facility
            .display_hours()
            .position(|hour| hour == local_now.hour())
    } else {
        None
    };
    let day_index = weekday_index(weekday);

    Ok(PopularityProfile {
        sensor_id: sensor_id.to_string(),
        day_index,
        day_name: DAY_NAMES[usize::from(day_index)],
        is_current_day,
        current_time: local_now.format(CURRENT_TIME_FORMAT).to_string(),
        total_days,
        current_hour_index,
        is_open: is_current_day && facility.is_open_at(local_now.hour()),
        buckets,
        status,
    })
}
