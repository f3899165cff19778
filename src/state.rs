use crate::config::MonitorConfig;
use crate::error::AppError;
use crate::estimation::{self, StatusReport};
use crate::popularity::{self, PopularityProfile};
use crate::sensor::SensorRegistry;
use crate::store::{ReadingStore, StoreError};
use chrono::{DateTime, Datelike, Utc};
use std::sync::Arc;

/// Everything a request needs. Read-only after startup; each call refreshes
/// the store once and is then computed from that one snapshot.
#[derive(Debug, Clone)]
pub struct AppState {
    config: Arc<MonitorConfig>,
    registry: Arc<SensorRegistry>,
    store: Arc<dyn ReadingStore>,
}

impl AppState {
    pub fn new(
        config: MonitorConfig,
        registry: SensorRegistry,
        store: Arc<dyn ReadingStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            store,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn registry(&self) -> &SensorRegistry {
        &self.registry
    }

    /// Sunday = 0 index of the local day at `now`.
    pub fn today_index(&self, now: DateTime<Utc>) -> u8 {
        popularity::weekday_index(now.with_timezone(&self.config.timezone).weekday())
    }

    pub fn estimate(&self, sensor_id: &str, now: DateTime<Utc>) -> Result<StatusReport, StoreError> {
        self.store.refresh()?;
        let kind = self.registry.kind_of(sensor_id);
        estimation::estimate(self.store.as_ref(), sensor_id, &kind, now, &self.config)
    }

    /// Status of every active sensor, in registration order.
    pub fn all_statuses(&self, now: DateTime<Utc>) -> Result<Vec<StatusReport>, StoreError> {
        self.store.refresh()?;
        self.registry
            .active_sensors()
            .iter()
            .map(|sensor| {
                estimation::estimate(
                    self.store.as_ref(),
                    &sensor.sensor_id,
                    &sensor.kind,
                    now,
                    &self.config,
                )
            })
            .collect()
    }

    /// Popularity for `day_index`, or for today when `None`.
    pub fn aggregate(
        &self,
        sensor_id: &str,
        day_index: Option<u8>,
        now: DateTime<Utc>,
    ) -> Result<PopularityProfile, AppError> {
        self.store.refresh()?;
        let kind = self.registry.kind_of(sensor_id);
        let day_index = day_index.unwrap_or_else(|| self.today_index(now));
        popularity::aggregate(
            self.store.as_ref(),
            sensor_id,
            &kind,
            day_index,
            now,
            &self.config,
        )
    }

    pub fn aggregate_week(
        &self,
        sensor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<PopularityProfile>, AppError> {
        self.store.refresh()?;
        let kind = self.registry.kind_of(sensor_id);
        popularity::aggregate_week(self.store.as_ref(), sensor_id, &kind, now, &self.config)
    }
}
