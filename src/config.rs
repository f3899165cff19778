use crate::estimation::model::{
    CycleConfig, DEFAULT_FILL_ADJUSTMENT_MINUTES, DEFAULT_GAP_TOLERANCE_MINUTES,
    DEFAULT_INACTIVE_TIMEOUT_MINUTES, DEFAULT_NO_DATA_FREE_MINUTES, DEFAULT_WINDOW,
    default_kind_profiles, minutes_to_delta,
};
use crate::popularity::FacilityConfig;
use crate::sensor::{CycleStyle, KindProfile, RegisteredSensor, SensorKind, SensorRegistry};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_STORE_PATH: &str = "data/readings.jsonl";
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Los_Angeles;
/// Longest configurable duration, one week.
pub const MAX_DURATION_MINUTES: f64 = 10_080.0;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub store: Option<StoreSection>,
    #[serde(default)]
    pub facility: Option<FacilitySection>,
    #[serde(default)]
    pub estimator: Option<EstimatorSection>,
    /// Per-kind cycle tuning, keyed by kind name.
    #[serde(default)]
    pub kinds: HashMap<String, KindSection>,
    #[serde(default)]
    pub sensors: Vec<SensorSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreSection {
    /// Append-only JSON-lines reading log
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FacilitySection {
    /// IANA zone name used for every local-calendar computation
    pub timezone: Option<String>,
    pub open_hour: Option<u32>,
    pub close_hour: Option<u32>,
    /// Readings per hour that count as a fully busy hour
    pub readings_per_busy_hour: Option<f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EstimatorSection {
    pub window: Option<usize>,
    pub gap_tolerance_minutes: Option<f64>,
    pub fill_adjustment_minutes: Option<f64>,
    pub inactive_timeout_minutes: Option<f64>,
    pub no_data_free_minutes: Option<f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KindSection {
    pub style: CycleStyle,
    pub cycle_minutes: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SensorSection {
    pub sensor_id: String,
    /// Defaults to the sensor id read as a kind name
    pub kind: Option<String>,
    pub name: Option<String>,
    pub location: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Immutable tuning handed to the estimator and the aggregator.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub timezone: Tz,
    pub cycle: CycleConfig,
    pub facility: FacilityConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE,
            cycle: CycleConfig::default(),
            facility: FacilityConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

impl Config {
    pub fn log_level(&self) -> &str {
        &self.logging.level
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn store_path(&self) -> &Path {
        self.store
            .as_ref()
            .and_then(|s| s.path.as_deref())
            .filter(|path| !path.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new(DEFAULT_STORE_PATH))
    }

    pub fn registry(&self) -> SensorRegistry {
        let sensors = self
            .sensors
            .iter()
            .map(|section| RegisteredSensor {
                sensor_id: section.sensor_id.clone(),
                kind: SensorKind::parse(section.kind.as_deref().unwrap_or(&section.sensor_id)),
                name: section.name.clone(),
                location: section.location.clone(),
                active: section.active,
            })
            .collect();
        SensorRegistry::new(sensors)
    }

    pub fn monitor_config(&self) -> Result<MonitorConfig, ConfigError> {
        Ok(MonitorConfig {
            timezone: self.timezone()?,
            cycle: self.cycle_config()?,
            facility: self.facility_config()?,
        })
    }

    fn timezone(&self) -> Result<Tz, ConfigError> {
        match self.facility.as_ref().and_then(|f| f.timezone.as_deref()) {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| ConfigError::Invalid(format!("unknown timezone: {name}"))),
            None => Ok(DEFAULT_TIMEZONE),
        }
    }

    fn facility_config(&self) -> Result<FacilityConfig, ConfigError> {
        let defaults = FacilityConfig::default();
        let Some(section) = self.facility.as_ref() else {
            return Ok(defaults);
        };
        let facility = FacilityConfig {
            open_hour: section.open_hour.unwrap_or(defaults.open_hour),
            close_hour: section.close_hour.unwrap_or(defaults.close_hour),
            readings_per_busy_hour: section
                .readings_per_busy_hour
                .unwrap_or(defaults.readings_per_busy_hour),
        };

        if facility.close_hour > 24 || facility.open_hour >= facility.close_hour {
            return Err(ConfigError::Invalid(format!(
                "facility hours must satisfy open_hour < close_hour <= 24 (got {}..{})",
                facility.open_hour, facility.close_hour
            )));
        }
        if facility.readings_per_busy_hour.is_nan() || facility.readings_per_busy_hour <= 0.0 {
            return Err(ConfigError::Invalid(
                "readings_per_busy_hour must be positive".to_string(),
            ));
        }
        Ok(facility)
    }

    fn cycle_config(&self) -> Result<CycleConfig, ConfigError> {
        let section = self.estimator.as_ref();
        let window = section.and_then(|s| s.window).unwrap_or(DEFAULT_WINDOW);
        if window == 0 {
            return Err(ConfigError::Invalid("estimator window must be > 0".to_string()));
        }

        let minutes = |value: Option<f64>, default: f64, field: &str| {
            let value = value.unwrap_or(default);
            if value.is_finite() && (0.0..=MAX_DURATION_MINUTES).contains(&value) {
                Ok(minutes_to_delta(value))
            } else {
                Err(ConfigError::Invalid(format!(
                    "{field} must be between 0 and {MAX_DURATION_MINUTES} minutes (got {value})"
                )))
            }
        };

        let mut kinds = default_kind_profiles();
        for (name, kind) in &self.kinds {
            if kind.cycle_minutes == 0 || f64::from(kind.cycle_minutes) > MAX_DURATION_MINUTES {
                return Err(ConfigError::Invalid(format!(
                    "kinds.{name}.cycle_minutes must be between 1 and {MAX_DURATION_MINUTES}"
                )));
            }
            kinds.insert(
                SensorKind::parse(name).as_str().to_string(),
                KindProfile {
                    style: kind.style,
                    cycle_minutes: kind.cycle_minutes,
                },
            );
        }

        Ok(CycleConfig {
            window,
            gap_tolerance: minutes(
                section.and_then(|s| s.gap_tolerance_minutes),
                DEFAULT_GAP_TOLERANCE_MINUTES,
                "gap_tolerance_minutes",
            )?,
            fill_adjustment: minutes(
                section.and_then(|s| s.fill_adjustment_minutes),
                DEFAULT_FILL_ADJUSTMENT_MINUTES,
                "fill_adjustment_minutes",
            )?,
            inactive_timeout: minutes(
                section.and_then(|s| s.inactive_timeout_minutes),
                DEFAULT_INACTIVE_TIMEOUT_MINUTES,
                "inactive_timeout_minutes",
            )?,
            no_data_free: minutes(
                section.and_then(|s| s.no_data_free_minutes),
                DEFAULT_NO_DATA_FREE_MINUTES,
                "no_data_free_minutes",
            )?,
            kinds,
        })
    }
}
