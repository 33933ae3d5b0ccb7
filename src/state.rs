use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::aggregate::HistoryBuckets;
use crate::alerts::AlertEvent;
use crate::classify::{self, MetricKind, Status, ThresholdTable};
use crate::config::{LocationConfig, LocationId};
use crate::rolling::{BATTERY_SEED, RollingBuffer};
use crate::source::CurrentReading;

/// One value of type `T` per metric. Keeps the invariant that every
/// location always carries all four metrics, even when empty.
#[derive(Debug, Clone, Serialize)]
pub struct PerMetric<T> {
    pub temperature: T,
    pub noise: T,
    pub humidity: T,
    pub battery: T,
}

impl<T> PerMetric<T> {
    pub fn get(&self, kind: MetricKind) -> &T {
        match kind {
            MetricKind::Temperature => &self.temperature,
            MetricKind::Noise => &self.noise,
            MetricKind::Humidity => &self.humidity,
            MetricKind::Battery => &self.battery,
        }
    }

    pub fn get_mut(&mut self, kind: MetricKind) -> &mut T {
        match kind {
            MetricKind::Temperature => &mut self.temperature,
            MetricKind::Noise => &mut self.noise,
            MetricKind::Humidity => &mut self.humidity,
            MetricKind::Battery => &mut self.battery,
        }
    }
}

/// Everything the presentation layer needs about one location.
///
/// Owned by the refresh coordinator: each cycle derives a new value from the
/// previous one and swaps it in wholesale. Nothing mutates a published
/// LocationState in place.
#[derive(Debug, Clone, Serialize)]
pub struct LocationState {
    pub id: LocationId,
    pub name: String,
    pub current: Option<CurrentReading>,
    pub battery_level: u8,
    pub rolling: PerMetric<RollingBuffer>,
    pub history: PerMetric<HistoryBuckets>,
    pub trends: PerMetric<f64>,
    pub statuses: PerMetric<Status>,
    pub composite: Status,
    pub last_error: Option<String>,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl LocationState {
    /// Startup state: zeroed buffers (battery gets its decline seed), empty
    /// history, everything Ok. The first render has no undefined entries.
    pub fn new(config: &LocationConfig) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            current: None,
            battery_level: 100,
            rolling: PerMetric {
                temperature: RollingBuffer::zeroed(),
                noise: RollingBuffer::zeroed(),
                humidity: RollingBuffer::zeroed(),
                battery: RollingBuffer::seeded(&BATTERY_SEED),
            },
            history: PerMetric {
                temperature: HistoryBuckets::empty(),
                noise: HistoryBuckets::empty(),
                humidity: HistoryBuckets::empty(),
                battery: HistoryBuckets::empty(),
            },
            trends: PerMetric {
                temperature: 0.0,
                noise: 0.0,
                humidity: 0.0,
                battery: 0.0,
            },
            statuses: PerMetric {
                temperature: Status::Ok,
                noise: Status::Ok,
                humidity: Status::Ok,
                battery: Status::Ok,
            },
            composite: Status::Ok,
            last_error: None,
            updated_at: None,
        }
    }

    /// Next state after a validated current reading: rolling buffers pushed,
    /// trends recomputed, statuses reclassified, error flag cleared.
    pub fn with_reading(&self, reading: CurrentReading, thresholds: &ThresholdTable) -> Self {
        let mut next = self.clone();

        let battery_level = reading
            .battery_pct
            .map(|pct| pct.round().clamp(0.0, 100.0) as u8)
            .unwrap_or(self.battery_level);

        next.rolling.temperature.push(reading.temperature_c);
        next.rolling.noise.push(reading.sound_db);
        next.rolling.humidity.push(reading.humidity_pct);
        next.rolling.battery.push(battery_level as f64);

        next.trends = PerMetric {
            temperature: next.rolling.temperature.trend(),
            noise: next.rolling.noise.trend(),
            humidity: next.rolling.humidity.trend(),
            battery: next.rolling.battery.battery_trend(),
        };

        next.statuses = PerMetric {
            temperature: classify::classify(
                MetricKind::Temperature,
                reading.temperature_c,
                thresholds,
            ),
            noise: classify::classify(MetricKind::Noise, reading.sound_db, thresholds),
            humidity: classify::classify(MetricKind::Humidity, reading.humidity_pct, thresholds),
            battery: classify::classify(MetricKind::Battery, battery_level as f64, thresholds),
        };
        next.composite = classify::composite([
            next.statuses.temperature,
            next.statuses.noise,
            next.statuses.humidity,
            next.statuses.battery,
        ]);

        next.updated_at = Some(reading.recorded_at);
        next.battery_level = battery_level;
        next.current = Some(reading);
        next.last_error = None;
        next
    }

    /// Next state after a failed or rejected fetch: everything kept, only
    /// the error flag set.
    pub fn with_error(&self, message: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.last_error = Some(message.into());
        next
    }

    /// Next state with fresh historical buckets from the slow cycle.
    pub fn with_history(&self, history: PerMetric<HistoryBuckets>) -> Self {
        let mut next = self.clone();
        next.history = history;
        next
    }
}

/// The full output snapshot served to the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub generated_at: Option<DateTime<Utc>>,
    pub locations: BTreeMap<LocationId, LocationState>,
    pub alerts: Vec<AlertEvent>,
}

impl Default for DashboardSnapshot {
    fn default() -> Self {
        Self {
            generated_at: None,
            locations: BTreeMap::new(),
            alerts: Vec::new(),
        }
    }
}

impl DashboardSnapshot {
    fn initial(locations: &[LocationConfig]) -> Self {
        Self {
            generated_at: None,
            locations: locations
                .iter()
                .map(|cfg| (cfg.id.clone(), LocationState::new(cfg)))
                .collect(),
            alerts: Vec::new(),
        }
    }
}

/// Health bookkeeping for one refresh loop.
#[derive(Debug, Clone, Serialize)]
pub struct LoopHealth {
    pub name: String,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub last_success_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl LoopHealth {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            last_success_at: None,
            consecutive_failures: 0,
            last_error: None,
        }
    }
}

#[derive(Default)]
struct SharedStateInner {
    snapshot: RwLock<DashboardSnapshot>,
    loop_health: RwLock<HashMap<String, LoopHealth>>,
}

/// Shared state container for the HTTP layer and the refresh loops.
#[derive(Clone, Default)]
pub struct SharedState {
    inner: Arc<SharedStateInner>,
}

impl SharedState {
    /// State seeded with default LocationStates for every configured
    /// location.
    pub fn new(locations: &[LocationConfig]) -> Self {
        Self {
            inner: Arc::new(SharedStateInner {
                snapshot: RwLock::new(DashboardSnapshot::initial(locations)),
                loop_health: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub async fn snapshot(&self) -> DashboardSnapshot {
        self.inner.snapshot.read().await.clone()
    }

    pub async fn location(&self, id: &LocationId) -> Option<LocationState> {
        self.inner.snapshot.read().await.locations.get(id).cloned()
    }

    pub async fn alerts(&self) -> Vec<AlertEvent> {
        self.inner.snapshot.read().await.alerts.clone()
    }

    /// Atomically replace the published snapshot.
    ///
    /// The rebuild closure runs under the write lock so it sees the latest
    /// published state (another cycle kind may have swapped in between this
    /// cycle's fetches and its publish). Readers observe either the old or
    /// the new snapshot, never a half-updated one.
    pub async fn replace_snapshot<F>(&self, rebuild: F)
    where
        F: FnOnce(&DashboardSnapshot) -> DashboardSnapshot,
    {
        let mut guard = self.inner.snapshot.write().await;
        let next = rebuild(&guard);
        *guard = next;
    }

    pub async fn record_loop_success(&self, loop_name: &str) {
        let mut guard = self.inner.loop_health.write().await;
        let entry = guard
            .entry(loop_name.to_string())
            .or_insert_with(|| LoopHealth::new(loop_name));
        entry.last_success_at = Some(Utc::now());
        entry.consecutive_failures = 0;
        entry.last_error = None;
    }

    pub async fn record_loop_failure(&self, loop_name: &str, error: String) {
        let mut guard = self.inner.loop_health.write().await;
        let entry = guard
            .entry(loop_name.to_string())
            .or_insert_with(|| LoopHealth::new(loop_name));
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        entry.last_error = Some(error);
    }

    pub async fn loop_health(&self) -> Vec<LoopHealth> {
        self.inner
            .loop_health
            .read()
            .await
            .values()
            .cloned()
            .collect()
    }

    pub async fn is_ready(&self, loop_names: &[&str], max_staleness: Duration) -> bool {
        let health = self.inner.loop_health.read().await;
        let now = Utc::now();
        let staleness = chrono::Duration::from_std(max_staleness)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));

        loop_names.iter().all(|name| {
            if let Some(entry) = health.get(*name) {
                if entry.consecutive_failures > 0 {
                    return false;
                }
                if let Some(last) = entry.last_success_at {
                    return now.signed_duration_since(last) <= staleness;
                }
                false
            } else {
                false
            }
        })
    }
}
