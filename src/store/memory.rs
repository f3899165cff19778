use crate::sensor::SensorId;
use crate::store::{HourlyUsage, Reading, ReadingStore, StoreError};
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Weekday};
use chrono_tz::Tz;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

/// Per-sensor readings kept in ascending timestamp order, with the local
/// calendar queries the aggregator needs.
#[derive(Debug, Clone)]
pub struct ReadingIndex {
    timezone: Tz,
    by_sensor: HashMap<SensorId, Vec<Reading>>,
}

impl ReadingIndex {
    pub fn new(timezone: Tz) -> Self {
        Self {
            timezone,
            by_sensor: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_sensor.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_sensor.values().all(Vec::is_empty)
    }

    pub fn insert(&mut self, reading: Reading) {
        let readings = self.by_sensor.entry(reading.sensor_id.clone()).or_default();
        let at = readings.partition_point(|existing| existing.timestamp <= reading.timestamp);
        readings.insert(at, reading);
    }

    pub fn recent(&self, sensor_id: &str, limit: usize) -> Vec<Reading> {
        self.by_sensor
            .get(sensor_id)
            .map(|readings| readings.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub fn grouped_by_hour(&self, sensor_id: &str, weekday: Weekday) -> Vec<HourlyUsage> {
        let mut hours: BTreeMap<u32, (BTreeSet<NaiveDate>, u64)> = BTreeMap::new();
        for local in self.local_times(sensor_id, weekday) {
            let (days, count) = hours.entry(local.hour()).or_default();
            days.insert(local.date_naive());
            *count += 1;
        }

        hours
            .into_iter()
            .map(|(hour, (days, reading_count))| HourlyUsage {
                hour,
                distinct_days: days.len() as u32,
                reading_count,
            })
            .collect()
    }

    pub fn total_days(&self, sensor_id: &str, weekday: Weekday) -> u32 {
        self.local_times(sensor_id, weekday)
            .map(|local| local.date_naive())
            .collect::<BTreeSet<_>>()
            .len() as u32
    }

    fn local_times(&self, sensor_id: &str, weekday: Weekday) -> impl Iterator<Item = DateTime<Tz>> {
        let timezone = self.timezone;
        self.by_sensor
            .get(sensor_id)
            .into_iter()
            .flatten()
            .map(move |reading| reading.timestamp.with_timezone(&timezone))
            .filter(move |local| local.weekday() == weekday)
    }
}

/// In-process store, used for tests and when embedding the estimator.
#[derive(Debug)]
pub struct MemoryStore {
    index: RwLock<ReadingIndex>,
}

impl MemoryStore {
    pub fn new(timezone: Tz) -> Self {
        Self {
            index: RwLock::new(ReadingIndex::new(timezone)),
        }
    }

    pub fn with_readings(timezone: Tz, readings: impl IntoIterator<Item = Reading>) -> Self {
        let mut index = ReadingIndex::new(timezone);
        for reading in readings {
            index.insert(reading);
        }
        Self {
            index: RwLock::new(index),
        }
    }

    pub fn insert(&self, reading: Reading) -> Result<(), StoreError> {
        let mut guard = self.index.write().map_err(|_| StoreError::Lock)?;
        guard.insert(reading);
        Ok(())
    }
}

impl ReadingStore for MemoryStore {
    fn fetch_recent(&self, sensor_id: &str, limit: usize) -> Result<Vec<Reading>, StoreError> {
        let guard = self.index.read().map_err(|_| StoreError::Lock)?;
        Ok(guard.recent(sensor_id, limit))
    }

    fn fetch_grouped_by_hour(
        &self,
        sensor_id: &str,
        weekday: Weekday,
    ) -> Result<Vec<HourlyUsage>, StoreError> {
        let guard = self.index.read().map_err(|_| StoreError::Lock)?;
        Ok(guard.grouped_by_hour(sensor_id, weekday))
    }

    fn fetch_total_days(&self, sensor_id: &str, weekday: Weekday) -> Result<u32, StoreError> {
        let guard = self.index.read().map_err(|_| StoreError::Lock)?;
        Ok(guard.total_days(sensor_id, weekday))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use chrono_tz::America::Los_Angeles;
    use std::sync::Arc;

    fn reading_at_local(sensor_id: &str, y: i32, m: u32, d: u32, h: u32, min: u32) -> Reading {
        let local = Los_Angeles
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .single()
            .expect("unambiguous local time");
        Reading {
            sensor_id: sensor_id.to_string(),
            timestamp: local.with_timezone(&Utc),
            voltage: None,
            temperature: None,
        }
    }

    #[test]
    fn recent_returns_newest_first_and_respects_limit() -> Result<(), StoreError> {
        let store = MemoryStore::with_readings(
            Los_Angeles,
            vec![
                reading_at_local("washer", 2025, 3, 31, 9, 2),
                reading_at_local("washer", 2025, 3, 31, 9, 0),
                reading_at_local("washer", 2025, 3, 31, 9, 1),
                reading_at_local("dryer", 2025, 3, 31, 9, 3),
            ],
        );

        let recent = store.fetch_recent("washer", 2)?;

        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0], reading_at_local("washer", 2025, 3, 31, 9, 2));
        assert_eq!(recent[1], reading_at_local("washer", 2025, 3, 31, 9, 1));
        Ok(())
    }

    #[test]
    fn unknown_sensor_has_no_readings() -> Result<(), StoreError> {
        let store = MemoryStore::new(Los_Angeles);

        assert!(store.fetch_recent("washer", 40)?.is_empty());
        assert_eq!(store.fetch_total_days("washer", Weekday::Mon)?, 0);
        assert!(store.fetch_grouped_by_hour("washer", Weekday::Mon)?.is_empty());
        Ok(())
    }

    #[test]
    fn grouping_uses_local_hours_and_dates() -> Result<(), StoreError> {
        // 2025-03-31 and 2025-04-07 are Mondays.
        let store = MemoryStore::with_readings(
            Los_Angeles,
            vec![
                reading_at_local("washer", 2025, 3, 31, 9, 0),
                reading_at_local("washer", 2025, 3, 31, 9, 1),
                reading_at_local("washer", 2025, 4, 7, 9, 0),
                reading_at_local("washer", 2025, 4, 7, 23, 30),
                reading_at_local("washer", 2025, 4, 1, 9, 0),
            ],
        );

        let grouped = store.fetch_grouped_by_hour("washer", Weekday::Mon)?;

        assert_eq!(
            grouped,
            vec![
                HourlyUsage {
                    hour: 9,
                    distinct_days: 2,
                    reading_count: 3,
                },
                HourlyUsage {
                    hour: 23,
                    distinct_days: 1,
                    reading_count: 1,
                },
            ]
        );
        assert_eq!(store.fetch_total_days("washer", Weekday::Mon)?, 2);
        assert_eq!(store.fetch_total_days("washer", Weekday::Tue)?, 1);
        Ok(())
    }

    #[test]
    fn late_evening_utc_reading_counts_toward_local_day() -> Result<(), StoreError> {
        // 2025-04-01 04:30 UTC is Monday 21:30 in Los Angeles.
        let reading = Reading {
            sensor_id: "washer".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 4, 1, 4, 30, 0).unwrap(),
            voltage: Some(3.1),
            temperature: None,
        };
        let store = MemoryStore::with_readings(Los_Angeles, vec![reading]);

        let grouped = store.fetch_grouped_by_hour("washer", Weekday::Mon)?;

        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].hour, 21);
        Ok(())
    }

    #[test]
    fn insert_reports_poisoned_lock() {
        let store = Arc::new(MemoryStore::new(Los_Angeles));
        let store_for_thread = Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = store_for_thread.index.write().expect("lock for poison");
            panic!("poison lock");
        })
        .join();

        let result = store.insert(reading_at_local("washer", 2025, 3, 31, 9, 0));

        assert!(matches!(result, Err(StoreError::Lock)));
        assert!(matches!(
            store.fetch_recent("washer", 1),
            Err(StoreError::Lock)
        ));
    }
}
