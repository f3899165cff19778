use crate::config::MonitorConfig;
use crate::sensor::{CycleStyle, KindProfile, SensorKind};
use crate::store::{Reading, ReadingStore, StoreError};
use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use tracing::debug;

pub mod dryer;
pub mod model;
pub mod washer;

use dryer::DryerModel;
use model::{CycleConfig, CycleModel, CycleStatus, ReadingWindow, whole_minutes};
use washer::WasherModel;

const MESSAGE_TIME_FORMAT: &str = "%I:%M %p";

/// Current state of one sensor plus the latest raw values it reported.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub sensor_id: String,
    pub kind: SensorKind,
    pub status: CycleStatus,
    pub voltage: Option<f64>,
    pub temperature: Option<f64>,
    /// False when the sensor has no readings and `status` is the synthetic
    /// free fallback rather than something observed.
    pub measured: bool,
    pub message: String,
}

// Model Factory
pub fn create_model(profile: KindProfile, config: &CycleConfig) -> Box<dyn CycleModel> {
    let cycle_length = TimeDelta::minutes(i64::from(profile.cycle_minutes));
    match profile.style {
        CycleStyle::Washer => Box::new(WasherModel {
            cycle_length,
            gap_tolerance: config.gap_tolerance,
            fill_adjustment: config.fill_adjustment,
        }),
        CycleStyle::Dryer => Box::new(DryerModel {
            cycle_length,
            gap_tolerance: config.gap_tolerance,
            inactive_timeout: config.inactive_timeout,
        }),
    }
}

/// Estimate the current cycle state of `sensor_id` from its trailing readings.
pub fn estimate(
    store: &dyn ReadingStore,
    sensor_id: &str,
    kind: &SensorKind,
    now: DateTime<Utc>,
    config: &MonitorConfig,
) -> Result<StatusReport, StoreError> {
    let readings = store.fetch_recent(sensor_id, config.cycle.window)?;
    Ok(estimate_from_readings(sensor_id, kind, &readings, now, config))
}

/// Same as [`estimate`] over readings already fetched, newest first. Every
/// reading given is examined; windowing is the caller's job.
pub fn estimate_from_readings(
    sensor_id: &str,
    kind: &SensorKind,
    readings: &[Reading],
    now: DateTime<Utc>,
    config: &MonitorConfig,
) -> StatusReport {
    debug_assert!(
        readings
            .windows(2)
            .all(|pair| pair[0].timestamp >= pair[1].timestamp),
        "readings must be ordered newest first"
    );

    let Some(window) = ReadingWindow::new(readings) else {
        debug!(sensor_id, "No readings, reporting synthetic free status");
        return no_data_report(sensor_id, kind, now, config);
    };

    let profile = config.cycle.profile_for(kind);
    let model = create_model(profile, &config.cycle);
    let status = model.classify(&window, now);
    let newest = window.newest();
    debug!(
        sensor_id,
        kind = %kind,
        busy = status.is_busy(),
        cycle_minutes = model.cycle_length().num_minutes(),
        readings = readings.len(),
        "Cycle state estimated"
    );

    StatusReport {
        sensor_id: sensor_id.to_string(),
        kind: kind.clone(),
        message: describe(kind, &status, config.timezone),
        status,
        voltage: newest.voltage,
        temperature: newest.temperature,
        measured: true,
    }
}

fn no_data_report(
    sensor_id: &str,
    kind: &SensorKind,
    now: DateTime<Utc>,
    config: &MonitorConfig,
) -> StatusReport {
    let free_minutes = whole_minutes(config.cycle.no_data_free);
    StatusReport {
        sensor_id: sensor_id.to_string(),
        kind: kind.clone(),
        status: CycleStatus::Free {
            free_since: now - config.cycle.no_data_free,
            free_minutes,
        },
        voltage: None,
        temperature: None,
        measured: false,
        message: format!("The {kind} has been free for the last {free_minutes} minutes"),
    }
}

pub fn describe(kind: &SensorKind, status: &CycleStatus, timezone: Tz) -> String {
    match status {
        CycleStatus::Busy {
            start_time,
            minutes_running,
            minutes_remaining,
        } => format!(
            "The {kind} is busy from {} for the last {minutes_running} minutes. Free in ~{minutes_remaining} minutes",
            start_time.with_timezone(&timezone).format(MESSAGE_TIME_FORMAT)
        ),
        CycleStatus::Free { free_minutes, .. } => {
            format!("The {kind} has been free for the last {free_minutes} minutes")
        }
    }
}
