//! Washer-style heuristic.
//!
//! Vibration only begins after the drum fills, so the detected start is moved
//! back by the fill adjustment. The machine is busy while the adjusted cycle
//! is still running and the sensor is still reporting.

use crate::estimation::model::{CycleModel, CycleStatus, ReadingWindow};
use chrono::{DateTime, TimeDelta, Utc};

#[derive(Debug, Clone)]
pub struct WasherModel {
    pub cycle_length: TimeDelta,
    pub gap_tolerance: TimeDelta,
    pub fill_adjustment: TimeDelta,
}

impl CycleModel for WasherModel {
    fn classify(&self, window: &ReadingWindow<'_>, now: DateTime<Utc>) -> CycleStatus {
        let last_seen = window.newest().timestamp;
        let adjusted_start = window.cycle_start(self.gap_tolerance) - self.fill_adjustment;
        let since_start = now - adjusted_start;
        let since_last = now - last_seen;

        if since_start <= self.cycle_length && since_last <= self.gap_tolerance {
            CycleStatus::busy(adjusted_start, since_start, self.cycle_length)
        } else {
            CycleStatus::free(last_seen, since_last)
        }
    }

    fn cycle_length(&self) -> TimeDelta {
        self.cycle_length
    }
}
