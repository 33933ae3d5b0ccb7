use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Semaphore;

use envmon::app::AppContext;
use envmon::config::{AppConfig, LocationId};
use envmon::metrics::AppMetrics;
use envmon::poller::{self, RefreshKind, TriggerOutcome};
use envmon::source::{CurrentReading, HistoryReading, ReadingSource};
use envmon::state::SharedState;

/// Deterministic fake source: fixed values, scriptable per-location
/// failures and malformed readings.
struct ScriptedSource {
    temperature_c: Mutex<f64>,
    failing: Mutex<HashSet<LocationId>>,
    malformed: Mutex<HashSet<LocationId>>,
}

impl ScriptedSource {
    fn new() -> Self {
        Self {
            temperature_c: Mutex::new(22.0),
            failing: Mutex::new(HashSet::new()),
            malformed: Mutex::new(HashSet::new()),
        }
    }

    fn set_temperature(&self, value: f64) {
        *self.temperature_c.lock().unwrap() = value;
    }

    fn set_failing(&self, ids: &[&LocationId]) {
        *self.failing.lock().unwrap() = ids.iter().map(|id| (*id).clone()).collect();
    }

    fn set_malformed(&self, ids: &[&LocationId]) {
        *self.malformed.lock().unwrap() = ids.iter().map(|id| (*id).clone()).collect();
    }
}

#[async_trait]
impl ReadingSource for ScriptedSource {
    async fn fetch_current(&self, location: &LocationId) -> Result<CurrentReading> {
        if self.failing.lock().unwrap().contains(location) {
            return Err(anyhow!("connection refused"));
        }
        let temperature_c = if self.malformed.lock().unwrap().contains(location) {
            f64::NAN
        } else {
            *self.temperature_c.lock().unwrap()
        };
        Ok(CurrentReading {
            temperature_c,
            sound_db: 40.0,
            humidity_pct: 50.0,
            battery_pct: Some(80.0),
            recorded_at: Utc::now(),
        })
    }

    async fn fetch_history(&self, location: &LocationId) -> Result<Vec<HistoryReading>> {
        if self.failing.lock().unwrap().contains(location) {
            return Err(anyhow!("connection refused"));
        }
        Ok(vec![HistoryReading {
            temperature_c: *self.temperature_c.lock().unwrap(),
            sound_db: 40.0,
            humidity_pct: 50.0,
            recorded_at: Utc::now(),
        }])
    }
}

fn build_context(source: Arc<dyn ReadingSource>) -> AppContext {
    let config = AppConfig::default();
    let metrics = AppMetrics::new().expect("metrics registry");
    let state = SharedState::new(&config.locations);
    AppContext::new(config, source, metrics, state)
}

#[tokio::test]
async fn one_failing_location_leaves_the_other_three_updated() {
    let source = Arc::new(ScriptedSource::new());
    let ctx = build_context(source.clone());
    let kitchen = LocationId::new("kitchen").unwrap();

    // First cycle: everyone healthy.
    let outcome = poller::trigger(&ctx, RefreshKind::Current).await.unwrap();
    assert_eq!(outcome, TriggerOutcome::Completed);
    let before = ctx.state.snapshot().await;
    let kitchen_before = before.locations[&kitchen].clone();
    assert!(kitchen_before.last_error.is_none());

    // Second cycle: kitchen offline, values shifted for everyone else.
    source.set_failing(&[&kitchen]);
    source.set_temperature(25.0);
    poller::trigger(&ctx, RefreshKind::Current).await.unwrap();

    let after = ctx.state.snapshot().await;
    for (id, location) in &after.locations {
        if *id == kitchen {
            continue;
        }
        assert_eq!(
            location.current.as_ref().unwrap().temperature_c,
            25.0,
            "location {id} should have refreshed"
        );
        assert!(location.last_error.is_none());
    }

    let kitchen_after = &after.locations[&kitchen];
    assert!(kitchen_after.last_error.is_some(), "error flag must be set");
    assert_eq!(
        kitchen_after.current.as_ref().unwrap().temperature_c,
        22.0,
        "failed location keeps its last known reading"
    );
    assert_eq!(kitchen_after.updated_at, kitchen_before.updated_at);
}

#[tokio::test]
async fn malformed_reading_skips_the_location_for_the_cycle() {
    let source = Arc::new(ScriptedSource::new());
    let ctx = build_context(source.clone());
    let garage = LocationId::new("garage").unwrap();

    poller::trigger(&ctx, RefreshKind::Current).await.unwrap();

    source.set_malformed(&[&garage]);
    source.set_temperature(26.0);
    poller::trigger(&ctx, RefreshKind::Current).await.unwrap();

    let snapshot = ctx.state.snapshot().await;
    let garage_state = &snapshot.locations[&garage];
    assert!(garage_state.last_error.is_some());
    assert_eq!(
        garage_state.current.as_ref().unwrap().temperature_c,
        22.0,
        "NaN never reaches the published state"
    );
    // a healthy neighbor did refresh
    let bedroom = LocationId::new("bedroom").unwrap();
    assert_eq!(
        snapshot.locations[&bedroom]
            .current
            .as_ref()
            .unwrap()
            .temperature_c,
        26.0
    );
}

#[tokio::test]
async fn all_locations_failing_marks_the_loop_unhealthy() {
    let source = Arc::new(ScriptedSource::new());
    let ctx = build_context(source.clone());
    let ids: Vec<LocationId> = ctx.config.locations.iter().map(|l| l.id.clone()).collect();
    source.set_failing(&ids.iter().collect::<Vec<_>>());

    let result = poller::trigger(&ctx, RefreshKind::Current).await;
    assert!(result.is_err(), "total outage fails the cycle");

    let health = ctx.state.loop_health().await;
    let current = health.iter().find(|h| h.name == "current").unwrap();
    assert_eq!(current.consecutive_failures, 1);
    assert!(current.last_error.is_some());
}

#[tokio::test]
async fn history_cycle_aggregates_and_isolates_failures() {
    let source = Arc::new(ScriptedSource::new());
    let ctx = build_context(source.clone());
    let kitchen = LocationId::new("kitchen").unwrap();
    let bedroom = LocationId::new("bedroom").unwrap();

    source.set_failing(&[&kitchen]);
    poller::trigger(&ctx, RefreshKind::History).await.unwrap();

    let snapshot = ctx.state.snapshot().await;
    let bedroom_buckets = &snapshot.locations[&bedroom].history.temperature;
    assert_eq!(
        bedroom_buckets.hour.iter().flatten().count(),
        1,
        "single reading lands in exactly one bucket"
    );

    let kitchen_state = &snapshot.locations[&kitchen];
    assert!(kitchen_state.last_error.is_some());
    assert_eq!(
        kitchen_state.history.temperature.hour.iter().flatten().count(),
        0,
        "failed location keeps its previous (empty) aggregation"
    );
    // battery buckets exist but stay empty everywhere
    assert_eq!(
        snapshot.locations[&bedroom]
            .history
            .battery
            .day
            .iter()
            .flatten()
            .count(),
        0
    );
}

/// Source that parks every fetch on a semaphore so a cycle can be held
/// in flight deliberately.
struct HeldSource {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl ReadingSource for HeldSource {
    async fn fetch_current(&self, _location: &LocationId) -> Result<CurrentReading> {
        let permit = self.gate.acquire().await?;
        permit.forget();
        Ok(CurrentReading {
            temperature_c: 21.0,
            sound_db: 40.0,
            humidity_pct: 50.0,
            battery_pct: Some(90.0),
            recorded_at: Utc::now(),
        })
    }

    async fn fetch_history(&self, _location: &LocationId) -> Result<Vec<HistoryReading>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn in_flight_cycle_rejects_a_second_trigger_of_the_same_kind() {
    let gate = Arc::new(Semaphore::new(0));
    let source = Arc::new(HeldSource { gate: gate.clone() });
    let ctx = build_context(source);

    let held_ctx = ctx.clone();
    let first = tokio::spawn(async move {
        poller::trigger(&held_ctx, RefreshKind::Current).await
    });
    // let the spawned cycle take the guard and park on the gate
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let second = poller::trigger(&ctx, RefreshKind::Current).await.unwrap();
    assert_eq!(second, TriggerOutcome::Busy, "overlapping cycle is skipped");

    // a different kind is unaffected by the held guard
    let other = poller::trigger(&ctx, RefreshKind::History).await.unwrap();
    assert_eq!(other, TriggerOutcome::Completed);

    gate.add_permits(64);
    let first = first.await.unwrap().unwrap();
    assert_eq!(first, TriggerOutcome::Completed);
}
