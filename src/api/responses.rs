use serde::Serialize;

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    Busy,
    Free,
}

/// One sensor's cycle state. Busy fields and free fields are mutually
/// exclusive; the absent group is omitted. Local times use the facility zone.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SensorStatusBody {
    pub sensor_id: String,
    pub sensor_type: String,
    pub status: MachineState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes_running: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes_remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_since: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_minutes: Option<i64>,
    pub message: String,
    pub voltage: Option<f64>,
    pub temperature: Option<f64>,
    pub measured: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SensorStatusResponse {
    #[serde(flatten)]
    pub sensor: SensorStatusBody,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct AllStatusResponse {
    pub sensors: Vec<SensorStatusBody>,
    pub timestamp: String,
}

/// Chart-ready popularity for one day. The per-hour lists are parallel and
/// ordered by hour.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct PopularTimesBody {
    pub sensor_id: String,
    pub sensor_type: String,
    pub day: &'static str,
    pub day_index: u8,
    pub all_days: Vec<&'static str>,
    pub hours: Vec<String>,
    pub hour_ranges: Vec<String>,
    pub data: Vec<u8>,
    pub categories: Vec<&'static str>,
    pub total_days: u32,
    pub current_hour_index: Option<usize>,
    pub status: MachineState,
    pub is_open: bool,
    pub current_time: String,
    pub is_current_day: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct PopularTimesResponse {
    #[serde(flatten)]
    pub profile: PopularTimesBody,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct WeekPopularTimesResponse {
    pub days: Vec<PopularTimesBody>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Ko,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub sensors: usize,
    pub measured: usize,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ErrorResponse {
    pub error_code: ErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidDay,
    InternalError,
}
