//! Dryer-style heuristic.
//!
//! Dryers vibrate from the first minute and report continuously while running,
//! so a short silence is enough to call the machine free. No fill adjustment.

use crate::estimation::model::{CycleModel, CycleStatus, ReadingWindow};
use chrono::{DateTime, TimeDelta, Utc};

#[derive(Debug, Clone)]
pub struct DryerModel {
    pub cycle_length: TimeDelta,
    pub gap_tolerance: TimeDelta,
    pub inactive_timeout: TimeDelta,
}

impl CycleModel for DryerModel {
    fn classify(&self, window: &ReadingWindow<'_>, now: DateTime<Utc>) -> CycleStatus {
        let last_seen = window.newest().timestamp;
        let since_last = now - last_seen;
        if since_last > self.inactive_timeout {
            return CycleStatus::free(last_seen, since_last);
        }

        let cycle_start = window.cycle_start(self.gap_tolerance);
        let since_start = now - cycle_start;
        if since_start <= self.cycle_length {
            CycleStatus::busy(cycle_start, since_start, self.cycle_length)
        } else {
            CycleStatus::free(last_seen, since_last)
        }
    }

    fn cycle_length(&self) -> TimeDelta {
        self.cycle_length
    }
}
