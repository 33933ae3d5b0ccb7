use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Timelike, Utc};
use serde::Serialize;

use crate::config::LocationId;

/// Latest sample from one location's sensor.
///
/// Battery rides along because the sensor firmware reports its charge with
/// every sample; history records carry only the environmental metrics.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentReading {
    pub temperature_c: f64,
    pub sound_db: f64,
    pub humidity_pct: f64,
    pub battery_pct: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

impl CurrentReading {
    /// Reject readings that would poison aggregation or classification.
    /// A malformed reading skips the location's update for the cycle; it is
    /// never patched up.
    pub fn validate(&self) -> Result<()> {
        if !self.temperature_c.is_finite() {
            bail!("temperature is not a finite number");
        }
        if !self.sound_db.is_finite() {
            bail!("sound level is not a finite number");
        }
        if !self.humidity_pct.is_finite() {
            bail!("humidity is not a finite number");
        }
        if let Some(battery) = self.battery_pct {
            if !battery.is_finite() || !(0.0..=100.0).contains(&battery) {
                bail!("battery level {battery} outside 0-100");
            }
        }
        Ok(())
    }
}

/// One historical sample. Arrives in arbitrary order from the source; the
/// aggregator sorts before bucketing.
#[derive(Debug, Clone)]
pub struct HistoryReading {
    pub temperature_c: f64,
    pub sound_db: f64,
    pub humidity_pct: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Where readings come from.
///
/// The transport behind this trait (serial gateway, HTTP collector, MQTT
/// broker) is out of scope; the pipeline only ever talks to this interface,
/// and tests substitute deterministic fakes.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    async fn fetch_current(&self, location: &LocationId) -> Result<CurrentReading>;

    async fn fetch_history(&self, location: &LocationId) -> Result<Vec<HistoryReading>>;
}

/// Deterministic waveform source used when no real sensor gateway is wired
/// up. Values depend only on the location id and the clock, so two fetches
/// at the same instant agree.
pub struct SimulatedSource {
    started_at: DateTime<Utc>,
}

impl SimulatedSource {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
        }
    }

    fn waveform(&self, location: &LocationId, at: DateTime<Utc>) -> (f64, f64, f64) {
        let phase = location_phase(location);
        let hour = at.hour() as f64 + at.minute() as f64 / 60.0;
        let daily = ((hour - 6.0) / 24.0 * std::f64::consts::TAU).sin();

        // Rooms idle around 21°C and warm through the afternoon.
        let temperature = 21.0 + phase * 1.5 + daily * 4.0;
        // Noise floor lifts during waking hours.
        let sound = 38.0 + phase * 4.0 + daily.max(0.0) * 22.0;
        // Humidity drifts opposite the temperature swing.
        let humidity = 45.0 + phase * 3.0 - daily * 8.0;

        (temperature, sound, humidity)
    }

    fn battery(&self, location: &LocationId, at: DateTime<Utc>) -> f64 {
        let elapsed_hours = (at - self.started_at).num_minutes() as f64 / 60.0;
        let start = 100.0 - location_phase(location) * 6.0;
        (start - elapsed_hours * 0.2).clamp(5.0, 100.0)
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadingSource for SimulatedSource {
    async fn fetch_current(&self, location: &LocationId) -> Result<CurrentReading> {
        let now = Utc::now();
        let (temperature_c, sound_db, humidity_pct) = self.waveform(location, now);
        Ok(CurrentReading {
            temperature_c,
            sound_db,
            humidity_pct,
            battery_pct: Some(self.battery(location, now)),
            recorded_at: now,
        })
    }

    async fn fetch_history(&self, location: &LocationId) -> Result<Vec<HistoryReading>> {
        let now = Utc::now();
        let mut readings = Vec::new();

        // Minute samples for the trailing hour, hourly samples for two weeks.
        for minutes_back in 0..60 {
            let at = now - Duration::minutes(minutes_back);
            let (temperature_c, sound_db, humidity_pct) = self.waveform(location, at);
            readings.push(HistoryReading {
                temperature_c,
                sound_db,
                humidity_pct,
                recorded_at: at,
            });
        }
        for hours_back in 1..(14 * 24) {
            let at = now - Duration::hours(hours_back);
            let (temperature_c, sound_db, humidity_pct) = self.waveform(location, at);
            readings.push(HistoryReading {
                temperature_c,
                sound_db,
                humidity_pct,
                recorded_at: at,
            });
        }

        Ok(readings)
    }
}

/// Small stable per-location offset so rooms don't trace identical curves.
fn location_phase(location: &LocationId) -> f64 {
    let hash = location
        .as_str()
        .bytes()
        .fold(0_u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
    (hash % 7) as f64 / 7.0 * 2.0 - 1.0
}
