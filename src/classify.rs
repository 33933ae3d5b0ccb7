use serde::{Deserialize, Serialize};

/// The four metrics every location reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Temperature,
    Noise,
    Humidity,
    Battery,
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Temperature,
        MetricKind::Noise,
        MetricKind::Humidity,
        MetricKind::Battery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Temperature => "temperature",
            MetricKind::Noise => "noise",
            MetricKind::Humidity => "humidity",
            MetricKind::Battery => "battery",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            MetricKind::Temperature => "°C",
            MetricKind::Noise => "dB",
            MetricKind::Humidity => "%",
            MetricKind::Battery => "%",
        }
    }
}

/// Health status for a metric or a whole location.
///
/// Declaration order doubles as severity order, so `max()` picks the most
/// severe status when deriving a location's composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    Info,
    Warning,
    Danger,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::Info => "info",
            Status::Warning => "warning",
            Status::Danger => "danger",
        }
    }
}

/// Per-metric breakpoints shared by the classifier and the alert engine.
///
/// A single table backs both subsystems; see DESIGN.md for the consolidation
/// decision. All bounds are configurable, defaults match the deployed sensor
/// fleet.
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdTable {
    #[serde(default = "ThresholdTable::default_temperature_danger_above")]
    pub temperature_danger_above: f64,
    #[serde(default = "ThresholdTable::default_temperature_warn_above")]
    pub temperature_warn_above: f64,
    #[serde(default = "ThresholdTable::default_temperature_info_below")]
    pub temperature_info_below: f64,
    #[serde(default = "ThresholdTable::default_noise_danger_above")]
    pub noise_danger_above: f64,
    #[serde(default = "ThresholdTable::default_noise_warn_above")]
    pub noise_warn_above: f64,
    #[serde(default = "ThresholdTable::default_humidity_high")]
    pub humidity_high: f64,
    #[serde(default = "ThresholdTable::default_humidity_low")]
    pub humidity_low: f64,
    #[serde(default = "ThresholdTable::default_battery_danger_below")]
    pub battery_danger_below: f64,
    #[serde(default = "ThresholdTable::default_battery_warn_below")]
    pub battery_warn_below: f64,
}

impl ThresholdTable {
    const fn default_temperature_danger_above() -> f64 {
        30.0
    }

    const fn default_temperature_warn_above() -> f64 {
        27.0
    }

    const fn default_temperature_info_below() -> f64 {
        18.0
    }

    const fn default_noise_danger_above() -> f64 {
        70.0
    }

    const fn default_noise_warn_above() -> f64 {
        55.0
    }

    const fn default_humidity_high() -> f64 {
        60.0
    }

    const fn default_humidity_low() -> f64 {
        30.0
    }

    const fn default_battery_danger_below() -> f64 {
        20.0
    }

    const fn default_battery_warn_below() -> f64 {
        40.0
    }
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            temperature_danger_above: Self::default_temperature_danger_above(),
            temperature_warn_above: Self::default_temperature_warn_above(),
            temperature_info_below: Self::default_temperature_info_below(),
            noise_danger_above: Self::default_noise_danger_above(),
            noise_warn_above: Self::default_noise_warn_above(),
            humidity_high: Self::default_humidity_high(),
            humidity_low: Self::default_humidity_low(),
            battery_danger_below: Self::default_battery_danger_below(),
            battery_warn_below: Self::default_battery_warn_below(),
        }
    }
}

/// Map a metric value to a health status against the breakpoint table.
///
/// Humidity is band-based: above the band is danger, below it is warning,
/// inside it is ok.
pub fn classify(metric: MetricKind, value: f64, thresholds: &ThresholdTable) -> Status {
    match metric {
        MetricKind::Temperature => {
            if value > thresholds.temperature_danger_above {
                Status::Danger
            } else if value > thresholds.temperature_warn_above {
                Status::Warning
            } else if value < thresholds.temperature_info_below {
                Status::Info
            } else {
                Status::Ok
            }
        }
        MetricKind::Noise => {
            if value > thresholds.noise_danger_above {
                Status::Danger
            } else if value > thresholds.noise_warn_above {
                Status::Warning
            } else {
                Status::Ok
            }
        }
        MetricKind::Humidity => {
            if value > thresholds.humidity_high {
                Status::Danger
            } else if value < thresholds.humidity_low {
                Status::Warning
            } else {
                Status::Ok
            }
        }
        MetricKind::Battery => {
            if value < thresholds.battery_danger_below {
                Status::Danger
            } else if value < thresholds.battery_warn_below {
                Status::Warning
            } else {
                Status::Ok
            }
        }
    }
}

/// Most severe status across a set of per-metric classifications.
pub fn composite<I>(statuses: I) -> Status
where
    I: IntoIterator<Item = Status>,
{
    statuses.into_iter().max().unwrap_or(Status::Ok)
}
