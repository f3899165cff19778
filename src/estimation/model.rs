//! Cycle model trait and the types shared by the washer and dryer heuristics.
//!
//! A model never sees an empty reading set; `ReadingWindow` carries that
//! guarantee. The no-data fallback is handled one level up in `estimate`.

use crate::sensor::{KindProfile, SensorKind};
use crate::store::Reading;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::fmt;

pub const DEFAULT_WINDOW: usize = 40;
pub const DEFAULT_GAP_TOLERANCE_MINUTES: f64 = 8.25;
pub const DEFAULT_FILL_ADJUSTMENT_MINUTES: f64 = 6.0;
pub const DEFAULT_INACTIVE_TIMEOUT_MINUTES: f64 = 3.0;
pub const DEFAULT_NO_DATA_FREE_MINUTES: f64 = 60.0;

/// Tuning for the cycle heuristics. Built once from the configuration and
/// shared read-only by every request.
#[derive(Debug, Clone)]
pub struct CycleConfig {
    /// Number of trailing readings examined per estimate.
    pub window: usize,
    /// Longest silence between two readings of the same cycle.
    pub gap_tolerance: TimeDelta,
    /// Washer fill phase that precedes the first detectable vibration.
    pub fill_adjustment: TimeDelta,
    /// Dryer silence after which the machine counts as stopped.
    pub inactive_timeout: TimeDelta,
    /// Age of the synthetic free-since reported when a sensor has no readings.
    pub no_data_free: TimeDelta,
    /// Profiles keyed by kind name.
    pub kinds: HashMap<String, KindProfile>,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            gap_tolerance: minutes_to_delta(DEFAULT_GAP_TOLERANCE_MINUTES),
            fill_adjustment: minutes_to_delta(DEFAULT_FILL_ADJUSTMENT_MINUTES),
            inactive_timeout: minutes_to_delta(DEFAULT_INACTIVE_TIMEOUT_MINUTES),
            no_data_free: minutes_to_delta(DEFAULT_NO_DATA_FREE_MINUTES),
            kinds: default_kind_profiles(),
        }
    }
}

impl CycleConfig {
    /// Profile for a kind. Unconfigured dryers get the dryer defaults; every
    /// other unconfigured kind is treated as a washer.
    pub fn profile_for(&self, kind: &SensorKind) -> KindProfile {
        if let Some(profile) = self.kinds.get(kind.as_str()) {
            return *profile;
        }
        match kind {
            SensorKind::Dryer => KindProfile::DRYER,
            SensorKind::Washer | SensorKind::Other(_) => self
                .kinds
                .get(SensorKind::Washer.as_str())
                .copied()
                .unwrap_or(KindProfile::WASHER),
        }
    }
}

pub fn default_kind_profiles() -> HashMap<String, KindProfile> {
    HashMap::from([
        (SensorKind::Washer.as_str().to_string(), KindProfile::WASHER),
        (SensorKind::Dryer.as_str().to_string(), KindProfile::DRYER),
    ])
}

pub fn minutes_to_delta(minutes: f64) -> TimeDelta {
    TimeDelta::milliseconds((minutes * 60_000.0).round() as i64)
}

/// Whole minutes in `delta`, truncated. Negative spans (readings stamped
/// after `now`) count as zero.
pub fn whole_minutes(delta: TimeDelta) -> i64 {
    delta.num_minutes().max(0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleStatus {
    Busy {
        start_time: DateTime<Utc>,
        minutes_running: i64,
        minutes_remaining: i64,
    },
    Free {
        free_since: DateTime<Utc>,
        free_minutes: i64,
    },
}

impl CycleStatus {
    pub fn busy(start_time: DateTime<Utc>, elapsed: TimeDelta, cycle_length: TimeDelta) -> Self {
        let minutes_running = whole_minutes(elapsed);
        Self::Busy {
            start_time,
            minutes_running,
            minutes_remaining: (cycle_length.num_minutes() - minutes_running).max(0),
        }
    }

    pub fn free(free_since: DateTime<Utc>, elapsed: TimeDelta) -> Self {
        Self::Free {
            free_since,
            free_minutes: whole_minutes(elapsed),
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

/// Trailing readings for one sensor, newest first and never empty.
#[derive(Debug, Clone, Copy)]
pub struct ReadingWindow<'a> {
    readings: &'a [Reading],
}

impl<'a> ReadingWindow<'a> {
    pub fn new(readings: &'a [Reading]) -> Option<Self> {
        if readings.is_empty() {
            None
        } else {
            Some(Self { readings })
        }
    }

    pub fn newest(&self) -> &'a Reading {
        &self.readings[0]
    }

    pub fn oldest(&self) -> &'a Reading {
        &self.readings[self.readings.len() - 1]
    }

    /// Start of the current cycle: the reading just after the first silence
    /// longer than `gap_tolerance`, scanning from newest to oldest. Without
    /// such a silence the whole window is one cycle and the oldest reading
    /// is the start.
    ///
    /// Only the newest boundary is found. Two short cycles closer together
    /// than `gap_tolerance` read as one long cycle.
    pub fn cycle_start(&self, gap_tolerance: TimeDelta) -> DateTime<Utc> {
        self.readings
            .windows(2)
            .find(|pair| pair[0].timestamp - pair[1].timestamp > gap_tolerance)
            .map(|pair| pair[0].timestamp)
            .unwrap_or(self.oldest().timestamp)
    }
}

/// A busy/free heuristic for one cycle style.
pub trait CycleModel: Send + Sync + fmt::Debug {
    fn classify(&self, window: &ReadingWindow<'_>, now: DateTime<Utc>) -> CycleStatus;

    fn cycle_length(&self) -> TimeDelta;
}
