//! Append-only reading log, one JSON object per line.
//!
//! ```text
//! {"sensor_id":"washer","timestamp":"2025-03-31 14:05:00","voltage":3.02,"temperature":21.5}
//! ```
//!
//! The ingestion side only ever appends. `refresh` tails the file from the
//! last consumed byte, so readings written by another process show up once the
//! store is refreshed. Queries only read what the last refresh indexed. A
//! trailing line without a newline is left for the next pass.

use crate::store::memory::ReadingIndex;
use crate::store::{HourlyUsage, Reading, ReadingStore, StoreError, normalize_timestamp};
use chrono::Weekday;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize, Deserialize)]
struct LogLine {
    sensor_id: String,
    timestamp: String,
    #[serde(default)]
    voltage: Option<f64>,
    #[serde(default)]
    temperature: Option<f64>,
}

impl From<&Reading> for LogLine {
    fn from(reading: &Reading) -> Self {
        Self {
            sensor_id: reading.sensor_id.clone(),
            timestamp: reading.timestamp.to_rfc3339(),
            voltage: reading.voltage,
            temperature: reading.temperature,
        }
    }
}

#[derive(Debug)]
struct Tail {
    offset: u64,
    index: ReadingIndex,
}

#[derive(Debug)]
pub struct JsonlStore {
    path: PathBuf,
    timezone: Tz,
    tail: RwLock<Tail>,
}

impl JsonlStore {
    /// Open (creating if needed) the log at `path` and load what it holds.
    pub fn open(path: impl AsRef<Path>, timezone: Tz) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)?;

        let store = Self {
            path,
            timezone,
            tail: RwLock::new(Tail {
                offset: 0,
                index: ReadingIndex::new(timezone),
            }),
        };
        store.refresh()?;
        let loaded = store.with_index(|index| index.len())?;
        info!(
            path = %store.path.display(),
            readings = loaded,
            "Reading log opened"
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, reading: &Reading) -> Result<(), StoreError> {
        let mut encoded = serde_json::to_string(&LogLine::from(reading))?;
        encoded.push('\n');
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(encoded.as_bytes())?;
        Ok(())
    }

    fn with_index<T>(&self, query: impl FnOnce(&ReadingIndex) -> T) -> Result<T, StoreError> {
        let tail = self.tail.read().map_err(|_| StoreError::Lock)?;
        Ok(query(&tail.index))
    }

    fn tail_log(&self, tail: &mut Tail) -> Result<(), StoreError> {
        let mut file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        if len < tail.offset {
            warn!(
                path = %self.path.display(),
                "Reading log shrank, reloading from start"
            );
            tail.offset = 0;
            tail.index = ReadingIndex::new(self.timezone);
        }
        if len == tail.offset {
            return Ok(());
        }

        file.seek(SeekFrom::Start(tail.offset))?;
        let mut buf = Vec::with_capacity((len - tail.offset) as usize);
        file.read_to_end(&mut buf)?;
        let Some(end) = buf.iter().rposition(|byte| *byte == b'\n') else {
            return Ok(());
        };

        let mut added = 0usize;
        for line in buf[..end].split(|byte| *byte == b'\n') {
            let parsed = match std::str::from_utf8(line) {
                Ok(text) if text.trim().is_empty() => continue,
                Ok(text) => parse_line(text.trim(), self.timezone),
                Err(err) => Err(StoreError::from(err)),
            };
            match parsed {
                Ok(reading) => {
                    tail.index.insert(reading);
                    added += 1;
                }
                Err(err) => {
                    warn!(
                        path = %self.path.display(),
                        error = %err,
                        "Skipping malformed reading log entry"
                    );
                }
            }
        }
        tail.offset += (end + 1) as u64;
        debug!(added, offset = tail.offset, "Reading log tailed");
        Ok(())
    }
}

fn parse_line(text: &str, timezone: Tz) -> Result<Reading, StoreError> {
    let line: LogLine = serde_json::from_str(text)?;
    Ok(Reading {
        timestamp: normalize_timestamp(&line.timestamp, timezone)?,
        sensor_id: line.sensor_id,
        voltage: line.voltage,
        temperature: line.temperature,
    })
}

impl ReadingStore for JsonlStore {
    fn refresh(&self) -> Result<(), StoreError> {
        let mut tail = self.tail.write().map_err(|_| StoreError::Lock)?;
        self.tail_log(&mut tail)
    }

    fn fetch_recent(&self, sensor_id: &str, limit: usize) -> Result<Vec<Reading>, StoreError> {
        self.with_index(|index| index.recent(sensor_id, limit))
    }

    fn fetch_grouped_by_hour(
        &self,
        sensor_id: &str,
        weekday: Weekday,
    ) -> Result<Vec<HourlyUsage>, StoreError> {
        self.with_index(|index| index.grouped_by_hour(sensor_id, weekday))
    }

    fn fetch_total_days(&self, sensor_id: &str, weekday: Weekday) -> Result<u32, StoreError> {
        self.with_index(|index| index.total_days(sensor_id, weekday))
    }
}
