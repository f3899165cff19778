use serde::Deserialize;
use std::fmt;

pub type SensorId = String;

pub const DEFAULT_SENSOR_ID: &str = "washer";
pub const DEFAULT_WASHER_CYCLE_MINUTES: u32 = 37;
pub const DEFAULT_DRYER_CYCLE_MINUTES: u32 = 64;

/// Appliance kind attached to a sensor. Not a closed set: kinds registered in
/// the configuration that are neither washer nor dryer end up in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Washer,
    Dryer,
    Other(String),
}

impl SensorKind {
    pub fn parse(name: &str) -> Self {
        let trimmed = name.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "washer" => Self::Washer,
            "dryer" => Self::Dryer,
            _ => Self::Other(trimmed.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Washer => "washer",
            Self::Dryer => "dryer",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which branch of the cycle heuristic a kind uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStyle {
    /// Fill delay before vibration starts; free needs a stale reading or an
    /// expired cycle.
    Washer,
    /// Vibrates from the first minute; free as soon as readings stop.
    Dryer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindProfile {
    pub style: CycleStyle,
    pub cycle_minutes: u32,
}

impl KindProfile {
    pub const WASHER: Self = Self {
        style: CycleStyle::Washer,
        cycle_minutes: DEFAULT_WASHER_CYCLE_MINUTES,
    };

    pub const DRYER: Self = Self {
        style: CycleStyle::Dryer,
        cycle_minutes: DEFAULT_DRYER_CYCLE_MINUTES,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredSensor {
    pub sensor_id: SensorId,
    pub kind: SensorKind,
    pub name: Option<String>,
    pub location: Option<String>,
    pub active: bool,
}

/// Sensors known to the deployment. Registration itself happens outside this
/// service; the registry only answers kind lookups and lists active sensors.
#[derive(Debug, Clone, Default)]
pub struct SensorRegistry {
    sensors: Vec<RegisteredSensor>,
}

impl SensorRegistry {
    pub fn new(sensors: Vec<RegisteredSensor>) -> Self {
        Self { sensors }
    }

    pub fn sensors(&self) -> &[RegisteredSensor] {
        &self.sensors
    }

    pub fn get(&self, sensor_id: &str) -> Option<&RegisteredSensor> {
        self.sensors.iter().find(|s| s.sensor_id == sensor_id)
    }

    /// Registered kind, or the sensor id read as a kind name for sensors that
    /// report under their appliance type ("washer", "dryer").
    pub fn kind_of(&self, sensor_id: &str) -> SensorKind {
        match self.get(sensor_id) {
            Some(sensor) => sensor.kind.clone(),
            None => SensorKind::parse(sensor_id),
        }
    }

    /// Active sensors in registration order. Falls back to a single washer
    /// when nothing is registered.
    pub fn active_sensors(&self) -> Vec<RegisteredSensor> {
        if self.sensors.is_empty() {
            return vec![RegisteredSensor {
                sensor_id: DEFAULT_SENSOR_ID.to_string(),
                kind: SensorKind::Washer,
                name: None,
                location: None,
                active: true,
            }];
        }
        self.sensors.iter().filter(|s| s.active).cloned().collect()
    }
}
