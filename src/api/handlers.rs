use crate::api::responses::{
    AllStatusResponse, ErrorCode, ErrorResponse, HealthResponse, HealthStatus, MachineState,
    PopularTimesBody, PopularTimesResponse, SensorStatusBody, SensorStatusResponse,
    WeekPopularTimesResponse,
};
use crate::error::AppError;
use crate::estimation::StatusReport;
use crate::estimation::model::CycleStatus;
use crate::popularity::{DAY_NAMES, PopularityProfile};
use crate::sensor::DEFAULT_SENSOR_ID;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::error;

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
const LOCAL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const FALLBACK_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

#[derive(Debug)]
enum TimestampError {
    Format(time::error::Format),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::Format(err) => write!(f, "timestamp format error: {err}"),
        }
    }
}

pub enum ApiResponse<T> {
    Success {
        status: StatusCode,
        body: T,
    },
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            ApiResponse::Success { status, body } => (status, Json(body)).into_response(),
            ApiResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SensorQuery {
    pub sensor: Option<String>,
}

impl SensorQuery {
    fn sensor_id(&self) -> &str {
        self.sensor
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SENSOR_ID)
    }
}

/// Store queries read the log from disk, so they run on the blocking pool.
async fn run_blocking<T, F>(build: F) -> Response
where
    T: Serialize,
    F: FnOnce(DateTime<Utc>) -> ApiResponse<T> + Send + 'static,
{
    let now = Utc::now();
    match tokio::task::spawn_blocking(move || build(now).into_response()).await {
        Ok(response) => response,
        Err(err) => internal_error::<()>(now, &err.to_string()).into_response(),
    }
}

pub async fn get_health(State(state): State<AppState>) -> Response {
    run_blocking(move |now| build_health_response(&state, now)).await
}

pub async fn get_all_status(State(state): State<AppState>) -> Response {
    run_blocking(move |now| build_all_status_response(&state, now)).await
}

pub async fn get_sensor_status(
    State(state): State<AppState>,
    Path(sensor_id): Path<String>,
) -> Response {
    run_blocking(move |now| build_sensor_status_response(&state, &sensor_id, now)).await
}

pub async fn get_popular_times(
    State(state): State<AppState>,
    Query(query): Query<SensorQuery>,
) -> Response {
    run_blocking(move |now| build_popular_times_response(&state, query.sensor_id(), None, now))
        .await
}

pub async fn get_popular_times_for_day(
    State(state): State<AppState>,
    Path(day): Path<u8>,
    Query(query): Query<SensorQuery>,
) -> Response {
    run_blocking(move |now| {
        build_popular_times_response(&state, query.sensor_id(), Some(day), now)
    })
    .await
}

pub async fn get_popular_times_week(
    State(state): State<AppState>,
    Query(query): Query<SensorQuery>,
) -> Response {
    run_blocking(move |now| build_week_response(&state, query.sensor_id(), now)).await
}

pub fn build_health_response(
    state: &AppState,
    now: DateTime<Utc>,
) -> ApiResponse<HealthResponse> {
    let (status, code, sensors, measured) = match state.all_statuses(now) {
        Ok(reports) => {
            let measured = reports.iter().filter(|r| r.measured).count();
            (HealthStatus::Ok, StatusCode::OK, reports.len(), measured)
        }
        Err(err) => {
            error!(error = %err, "Reading store unavailable during health check");
            (HealthStatus::Ko, StatusCode::SERVICE_UNAVAILABLE, 0, 0)
        }
    };

    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Success {
            status: code,
            body: HealthResponse {
                status,
                sensors,
                measured,
                timestamp,
            },
        },
        Err(err) => internal_error(now, &err.to_string()),
    }
}

pub fn build_all_status_response(
    state: &AppState,
    now: DateTime<Utc>,
) -> ApiResponse<AllStatusResponse> {
    let reports = match state.all_statuses(now) {
        Ok(reports) => reports,
        Err(err) => return internal_error(now, &err.to_string()),
    };
    let timezone = state.config().timezone;
    success(now, |timestamp| AllStatusResponse {
        sensors: reports.iter().map(|r| status_body(r, timezone)).collect(),
        timestamp,
    })
}

pub fn build_sensor_status_response(
    state: &AppState,
    sensor_id: &str,
    now: DateTime<Utc>,
) -> ApiResponse<SensorStatusResponse> {
    let report = match state.estimate(sensor_id, now) {
        Ok(report) => report,
        Err(err) => return internal_error(now, &err.to_string()),
    };
    let timezone = state.config().timezone;
    success(now, |timestamp| SensorStatusResponse {
        sensor: status_body(&report, timezone),
        timestamp,
    })
}

pub fn build_popular_times_response(
    state: &AppState,
    sensor_id: &str,
    day: Option<u8>,
    now: DateTime<Utc>,
) -> ApiResponse<PopularTimesResponse> {
    match state.aggregate(sensor_id, day, now) {
        Ok(profile) => success(now, |timestamp| PopularTimesResponse {
            profile: popular_times_body(&profile),
            timestamp,
        }),
        Err(err) => app_error(now, &err),
    }
}

pub fn build_week_response(
    state: &AppState,
    sensor_id: &str,
    now: DateTime<Utc>,
) -> ApiResponse<WeekPopularTimesResponse> {
    match state.aggregate_week(sensor_id, now) {
        Ok(profiles) => success(now, |timestamp| WeekPopularTimesResponse {
            days: profiles.iter().map(popular_times_body).collect(),
            timestamp,
        }),
        Err(err) => app_error(now, &err),
    }
}

fn machine_state(status: &CycleStatus) -> MachineState {
    match status {
        CycleStatus::Busy { .. } => MachineState::Busy,
        CycleStatus::Free { .. } => MachineState::Free,
    }
}

fn local_time(instant: DateTime<Utc>, timezone: Tz) -> String {
    instant
        .with_timezone(&timezone)
        .format(LOCAL_TIME_FORMAT)
        .to_string()
}

fn status_body(report: &StatusReport, timezone: Tz) -> SensorStatusBody {
    let mut body = SensorStatusBody {
        sensor_id: report.sensor_id.clone(),
        sensor_type: report.kind.as_str().to_string(),
        status: machine_state(&report.status),
        start_time: None,
        minutes_running: None,
        minutes_remaining: None,
        free_since: None,
        free_minutes: None,
        message: report.message.clone(),
        voltage: report.voltage,
        temperature: report.temperature,
        measured: report.measured,
    };
    match report.status {
        CycleStatus::Busy {
            start_time,
            minutes_running,
            minutes_remaining,
        } => {
            body.start_time = Some(local_time(start_time, timezone));
            body.minutes_running = Some(minutes_running);
            body.minutes_remaining = Some(minutes_remaining);
        }
        CycleStatus::Free {
            free_since,
            free_minutes,
        } => {
            body.free_since = Some(local_time(free_since, timezone));
            body.free_minutes = Some(free_minutes);
        }
    }
    body
}

fn popular_times_body(profile: &PopularityProfile) -> PopularTimesBody {
    PopularTimesBody {
        sensor_id: profile.sensor_id.clone(),
        sensor_type: profile.status.kind.as_str().to_string(),
        day: profile.day_name,
        day_index: profile.day_index,
        all_days: DAY_NAMES.to_vec(),
        hours: profile.buckets.iter().map(|b| b.label.clone()).collect(),
        hour_ranges: profile
            .buckets
            .iter()
            .map(|b| b.range_label.clone())
            .collect(),
        data: profile.buckets.iter().map(|b| b.busy_percentage).collect(),
        categories: profile.buckets.iter().map(|b| b.category.label()).collect(),
        total_days: profile.total_days,
        current_hour_index: profile.current_hour_index,
        status: machine_state(&profile.status.status),
        is_open: profile.is_open,
        current_time: profile.current_time.clone(),
        is_current_day: profile.is_current_day,
    }
}

fn success<T>(now: DateTime<Utc>, body: impl FnOnce(String) -> T) -> ApiResponse<T> {
    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Success {
            status: StatusCode::OK,
            body: body(timestamp),
        },
        Err(err) => internal_error(now, &err.to_string()),
    }
}

fn app_error<T>(now: DateTime<Utc>, err: &AppError) -> ApiResponse<T> {
    match err {
        AppError::InvalidDay(_) => ApiResponse::Error {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse {
                error_code: ErrorCode::InvalidDay,
                error_message: err.to_string(),
                timestamp: error_timestamp(now),
            },
        },
        AppError::Store(_) => internal_error(now, &err.to_string()),
    }
}

fn internal_error<T>(now: DateTime<Utc>, message: &str) -> ApiResponse<T> {
    error!(message = message, "Internal error while handling request");
    ApiResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: ErrorResponse {
            error_code: ErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: error_timestamp(now),
        },
    }
}

fn error_timestamp(now: DateTime<Utc>) -> String {
    format_timestamp(now).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format error timestamp");
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| FALLBACK_TIMESTAMP.to_string())
    })
}

fn format_timestamp(now: DateTime<Utc>) -> Result<String, TimestampError> {
    let datetime = OffsetDateTime::from(SystemTime::from(now));
    datetime.format(&Rfc3339).map_err(TimestampError::Format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::sensor::{RegisteredSensor, SensorKind, SensorRegistry};
    use crate::store::{HourlyUsage, MemoryStore, Reading, ReadingStore, StoreError};
    use chrono::{TimeDelta, TimeZone, Weekday};
    use chrono_tz::America::Los_Angeles;
    use std::sync::Arc;

    #[derive(Debug)]
    struct UnavailableStore;

    impl ReadingStore for UnavailableStore {
        fn fetch_recent(&self, _: &str, _: usize) -> Result<Vec<Reading>, StoreError> {
            Err(StoreError::Lock)
        }

        fn fetch_grouped_by_hour(
            &self,
            _: &str,
            _: Weekday,
        ) -> Result<Vec<HourlyUsage>, StoreError> {
            Err(StoreError::Lock)
        }

        fn fetch_total_days(&self, _: &str, _: Weekday) -> Result<u32, StoreError> {
            Err(StoreError::Lock)
        }
    }

    fn now() -> DateTime<Utc> {
        // Monday 2025-03-31 15:00 in Los Angeles.
        Utc.with_ymd_and_hms(2025, 3, 31, 22, 0, 0).unwrap()
    }

    fn minute_run(sensor_id: &str, from: i64, to: i64) -> Vec<Reading> {
        (from..=to)
            .map(|m| Reading {
                sensor_id: sensor_id.to_string(),
                timestamp: now() + TimeDelta::minutes(m),
                voltage: Some(3.0),
                temperature: Some(19.5),
            })
            .collect()
    }

    fn registry() -> SensorRegistry {
        let sensor = |id: &str, kind| RegisteredSensor {
            sensor_id: id.to_string(),
            kind,
            name: None,
            location: None,
            active: true,
        };
        SensorRegistry::new(vec![
            sensor("washer", SensorKind::Washer),
            sensor("dryer", SensorKind::Dryer),
        ])
    }

    fn state_with(readings: Vec<Reading>) -> AppState {
        let store = MemoryStore::with_readings(Los_Angeles, readings);
        AppState::new(MonitorConfig::default(), registry(), Arc::new(store))
    }

    fn unavailable_state() -> AppState {
        AppState::new(
            MonitorConfig::default(),
            registry(),
            Arc::new(UnavailableStore),
        )
    }

    #[test]
    fn sensor_status_reports_busy_cycle_in_local_time() {
        let state = state_with(minute_run("dryer", -12, 0));

        let response = build_sensor_status_response(&state, "dryer", now());

        match response {
            ApiResponse::Success { status, body } => {
                assert_eq!(status, StatusCode::OK);
                assert_eq!(body.sensor.sensor_type, "dryer");
                assert_eq!(body.sensor.status, MachineState::Busy);
                assert_eq!(
                    body.sensor.start_time.as_deref(),
                    Some("2025-03-31 14:48:00")
                );
                assert_eq!(body.sensor.minutes_running, Some(12));
                assert_eq!(body.sensor.minutes_remaining, Some(52));
                assert_eq!(body.sensor.free_since, None);
                assert_eq!(body.sensor.voltage, Some(3.0));
                assert!(body.sensor.measured);
                assert_eq!(body.timestamp, "2025-03-31T22:00:00Z");
            }
            ApiResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[test]
    fn sensor_status_without_readings_is_synthetic_free() {
        let state = state_with(Vec::new());

        let response = build_sensor_status_response(&state, "washer", now());

        match response {
            ApiResponse::Success { body, .. } => {
                assert_eq!(body.sensor.status, MachineState::Free);
                assert_eq!(
                    body.sensor.free_since.as_deref(),
                    Some("2025-03-31 14:00:00")
                );
                assert_eq!(body.sensor.free_minutes, Some(60));
                assert_eq!(body.sensor.voltage, None);
                assert!(!body.sensor.measured);
            }
            ApiResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[test]
    fn all_status_lists_registered_sensors() {
        let mut readings = minute_run("washer", -5, 0);
        readings.extend(minute_run("dryer", -30, -20));
        let state = state_with(readings);

        let response = build_all_status_response(&state, now());

        match response {
            ApiResponse::Success { body, .. } => {
                let ids: Vec<_> = body.sensors.iter().map(|s| s.sensor_id.as_str()).collect();
                assert_eq!(ids, vec!["washer", "dryer"]);
                assert_eq!(body.sensors[0].status, MachineState::Busy);
                assert_eq!(body.sensors[1].status, MachineState::Free);
                assert_eq!(body.sensors[1].free_minutes, Some(20));
            }
            ApiResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[test]
    fn store_failure_maps_to_internal_error() {
        let state = unavailable_state();

        let response = build_sensor_status_response(&state, "washer", now());

        match response {
            ApiResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body.error_code, ErrorCode::InternalError);
                assert_eq!(body.error_message, "Internal server error");
                assert_eq!(body.timestamp, "2025-03-31T22:00:00Z");
            }
            ApiResponse::Success { .. } => panic!("expected internal error response"),
        }
    }

    #[test]
    fn invalid_day_maps_to_bad_request() {
        let state = state_with(Vec::new());

        let response = build_popular_times_response(&state, "washer", Some(7), now());

        match response {
            ApiResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(body.error_code, ErrorCode::InvalidDay);
                assert!(body.error_message.contains('7'));
            }
            ApiResponse::Success { .. } => panic!("expected invalid day response"),
        }
    }

    #[test]
    fn popular_times_defaults_to_today() {
        let state = state_with(minute_run("washer", -5, 0));

        let response = build_popular_times_response(&state, "washer", None, now());

        match response {
            ApiResponse::Success { body, .. } => {
                let profile = body.profile;
                assert_eq!(profile.day, "Monday");
                assert_eq!(profile.day_index, 1);
                assert_eq!(profile.all_days.len(), 7);
                assert_eq!(profile.hours.len(), 15);
                assert_eq!(profile.hours[0], "7:00");
                assert_eq!(profile.hour_ranges[14], "9–10PM");
                assert_eq!(profile.data.len(), 15);
                assert_eq!(profile.categories.len(), 15);
                assert_eq!(profile.current_hour_index, Some(8));
                assert_eq!(profile.current_time, "03:00 PM");
                assert_eq!(profile.status, MachineState::Busy);
                assert!(profile.is_open);
                assert!(profile.is_current_day);
            }
            ApiResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[test]
    fn week_response_has_seven_days() {
        let state = state_with(minute_run("dryer", -5, 0));

        let response = build_week_response(&state, "dryer", now());

        match response {
            ApiResponse::Success { body, .. } => {
                let days: Vec<_> = body.days.iter().map(|d| d.day_index).collect();
                assert_eq!(days, vec![0, 1, 2, 3, 4, 5, 6]);
                assert!(body.days.iter().all(|d| d.sensor_type == "dryer"));
                assert_eq!(body.days.iter().filter(|d| d.is_open).count(), 1);
            }
            ApiResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[test]
    fn health_is_ok_when_store_answers() {
        let state = state_with(minute_run("washer", -5, 0));

        let response = build_health_response(&state, now());

        match response {
            ApiResponse::Success { status, body } => {
                assert_eq!(status, StatusCode::OK);
                assert_eq!(body.status, HealthStatus::Ok);
                assert_eq!(body.sensors, 2);
                assert_eq!(body.measured, 1);
            }
            ApiResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[test]
    fn health_is_ko_when_store_fails() {
        let state = unavailable_state();

        let response = build_health_response(&state, now());

        match response {
            ApiResponse::Success { status, body } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body.status, HealthStatus::Ko);
            }
            ApiResponse::Error { status, .. } => {
                panic!("expected ko health response, got error: {status}");
            }
        }
    }

    #[test]
    fn sensor_query_defaults_to_washer() {
        assert_eq!(SensorQuery::default().sensor_id(), "washer");
        let blank = SensorQuery {
            sensor: Some("  ".to_string()),
        };
        assert_eq!(blank.sensor_id(), "washer");
        let dryer = SensorQuery {
            sensor: Some("dryer".to_string()),
        };
        assert_eq!(dryer.sensor_id(), "dryer");
    }

    #[test]
    fn handlers_answer_from_the_blocking_pool() -> Result<(), std::io::Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()?;
        let state = state_with(minute_run("dryer", -12, 0));

        let status = runtime.block_on(get_sensor_status(
            State(state),
            Path("dryer".to_string()),
        ));
        let failed = runtime.block_on(get_all_status(State(unavailable_state())));

        assert_eq!(status.status(), StatusCode::OK);
        assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
        Ok(())
    }
}
