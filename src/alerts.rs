use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::classify::{MetricKind, Status, ThresholdTable};
use crate::config::LocationId;
use crate::source::CurrentReading;

/// One breached condition at one location.
///
/// Alerts are recomputed in full every fast cycle and never accumulated;
/// `observed_at` is the reading's absolute timestamp, and any "x minutes
/// ago" rendering belongs to the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    pub location: LocationId,
    pub metric: MetricKind,
    pub message: String,
    pub severity: Status,
    pub observed_at: DateTime<Utc>,
}

/// Scan the latest reading of every location against the breach conditions
/// and emit one event per breach.
///
/// Stateless: the output depends only on the readings passed in. The caller
/// gets the full cross-location set and filters per location itself.
pub fn derive_alerts<'a, I>(readings: I, thresholds: &ThresholdTable) -> Vec<AlertEvent>
where
    I: IntoIterator<Item = (&'a LocationId, &'a CurrentReading)>,
{
    let mut events = Vec::new();

    for (location, reading) in readings {
        if reading.temperature_c > thresholds.temperature_danger_above {
            events.push(AlertEvent {
                location: location.clone(),
                metric: MetricKind::Temperature,
                message: format!(
                    "Temperature exceeds threshold ({:.1}°C)",
                    reading.temperature_c
                ),
                severity: Status::Danger,
                observed_at: reading.recorded_at,
            });
        }

        if reading.sound_db > thresholds.noise_danger_above {
            events.push(AlertEvent {
                location: location.clone(),
                metric: MetricKind::Noise,
                message: format!("Noise spike detected ({:.0}dB)", reading.sound_db),
                severity: Status::Danger,
                observed_at: reading.recorded_at,
            });
        }

        if reading.humidity_pct > thresholds.humidity_high {
            events.push(AlertEvent {
                location: location.clone(),
                metric: MetricKind::Humidity,
                message: format!(
                    "Humidity above comfort band ({:.1}%)",
                    reading.humidity_pct
                ),
                severity: Status::Warning,
                observed_at: reading.recorded_at,
            });
        } else if reading.humidity_pct < thresholds.humidity_low {
            events.push(AlertEvent {
                location: location.clone(),
                metric: MetricKind::Humidity,
                message: format!(
                    "Humidity below comfort band ({:.1}%)",
                    reading.humidity_pct
                ),
                severity: Status::Warning,
                observed_at: reading.recorded_at,
            });
        }
    }

    events
}
